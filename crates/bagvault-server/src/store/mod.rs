//! Persistent record stores
//!
//! Two collections are owned by this core: archive records (one per
//! ingested version of a logical work) and workflow jobs (one per external
//! processing run). Both are defined as traits so the orchestrators take
//! their persistence as an explicit collaborator; production uses the
//! Postgres implementation, tests and dev mode the in-memory one.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryArchiveStore, MemoryJobStore};
pub use postgres::{PgArchiveStore, PgJobStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngestResult;

// ============================================================================
// Archive records
// ============================================================================

/// Durable record of one ingested version of a logical work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub id: Uuid,
    /// Persistent identifier; immutable once assigned, unique per record
    pub pid: String,
    /// Empty once a newer version supersedes this record as the
    /// disk-resident copy
    pub online_storage_id: String,
    /// Absent when the tape tier is administratively disabled
    pub offline_storage_id: Option<String>,
    /// Stable across all versions of the same logical work
    pub work_identifier: String,
    /// Fingerprint of the payload manifest, used for duplicate detection
    pub payload_checksum: String,
    /// Weak reference to the previous version (pid lookup, not ownership)
    pub previous_pid: Option<String>,
    /// Ordered weak references to succeeding versions
    pub next_pids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ArchiveRecord {
    pub fn new(
        pid: String,
        online_storage_id: String,
        offline_storage_id: Option<String>,
        work_identifier: String,
        payload_checksum: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pid,
            online_storage_id,
            offline_storage_id,
            work_identifier,
            payload_checksum,
            previous_pid: None,
            next_pids: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Store for [`ArchiveRecord`]s
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Insert a new record. The `pid` must be unused.
    async fn insert(&self, record: &ArchiveRecord) -> IngestResult<()>;

    /// Look up a record by its pid
    async fn find_by_pid(&self, pid: &str) -> IngestResult<Option<ArchiveRecord>>;

    /// Most recently created record sharing a logical-work identifier
    async fn find_latest_by_work(&self, work_identifier: &str)
        -> IngestResult<Option<ArchiveRecord>>;

    /// Persist the mutable linkage fields (`previous_pid`, `next_pids`,
    /// `online_storage_id`) of an existing record
    async fn update_links(&self, record: &ArchiveRecord) -> IngestResult<()>;
}

// ============================================================================
// Workflow jobs
// ============================================================================

/// State machine of an externally-dispatched processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Accepted,
    Preparing,
    Running,
    Success,
    Failed,
    Unknown,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Accepted => "accepted",
            JobStatus::Preparing => "preparing",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = crate::error::IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(JobStatus::Accepted),
            "preparing" => Ok(JobStatus::Preparing),
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            "unknown" => Ok(JobStatus::Unknown),
            other => Err(crate::error::IngestError::InconsistentState(format!(
                "unknown job status {other}"
            ))),
        }
    }
}

/// Durable record of one external processing run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowJob {
    pub id: Uuid,
    pub username: String,
    pub source_pid: String,
    pub result_pid: Option<String>,
    pub remote_job_id: Option<String>,
    pub workspace_handle: Option<String>,
    pub status: JobStatus,
    /// Reconciliation cycles that saw a non-terminal remote status
    pub check_count: i32,
    pub workspace_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowJob {
    pub fn new(username: String, source_pid: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            source_pid,
            result_pid: None,
            remote_job_id: None,
            workspace_handle: None,
            status: JobStatus::Accepted,
            check_count: 0,
            workspace_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Store for [`WorkflowJob`]s
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &WorkflowJob) -> IngestResult<()>;

    async fn update(&self, job: &WorkflowJob) -> IngestResult<()>;

    async fn find_by_id(&self, id: Uuid) -> IngestResult<Option<WorkflowJob>>;

    /// Whether the user already has a run in `Running` state
    async fn has_running_for_user(&self, username: &str) -> IngestResult<bool>;

    /// Jobs awaiting reconciliation: `Running`, plus `Unknown` from an
    /// earlier cycle that could not reach the remote service
    async fn find_reconcilable(&self) -> IngestResult<Vec<WorkflowJob>>;
}
