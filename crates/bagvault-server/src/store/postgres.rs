//! Postgres store implementations
//!
//! Queries are bound at runtime; the schema lives in `migrations/`.
//! `next_pids` is a `TEXT[]` column, which sqlx maps to `Vec<String>`
//! directly.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::IngestResult;

use super::{ArchiveRecord, ArchiveStore, JobStatus, JobStore, WorkflowJob};

#[derive(sqlx::FromRow)]
struct ArchiveRecordRow {
    id: Uuid,
    pid: String,
    online_storage_id: String,
    offline_storage_id: Option<String>,
    work_identifier: String,
    payload_checksum: String,
    previous_pid: Option<String>,
    next_pids: Vec<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ArchiveRecordRow> for ArchiveRecord {
    fn from(row: ArchiveRecordRow) -> Self {
        ArchiveRecord {
            id: row.id,
            pid: row.pid,
            online_storage_id: row.online_storage_id,
            offline_storage_id: row.offline_storage_id,
            work_identifier: row.work_identifier,
            payload_checksum: row.payload_checksum,
            previous_pid: row.previous_pid,
            next_pids: row.next_pids,
            created_at: row.created_at,
        }
    }
}

/// Postgres-backed [`ArchiveStore`]
#[derive(Clone)]
pub struct PgArchiveStore {
    pool: PgPool,
}

impl PgArchiveStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArchiveStore for PgArchiveStore {
    async fn insert(&self, record: &ArchiveRecord) -> IngestResult<()> {
        sqlx::query(
            r#"
            INSERT INTO archive_records (
                id, pid, online_storage_id, offline_storage_id,
                work_identifier, payload_checksum, previous_pid, next_pids, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(&record.pid)
        .bind(&record.online_storage_id)
        .bind(&record.offline_storage_id)
        .bind(&record.work_identifier)
        .bind(&record.payload_checksum)
        .bind(&record.previous_pid)
        .bind(&record.next_pids)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_pid(&self, pid: &str) -> IngestResult<Option<ArchiveRecord>> {
        let row: Option<ArchiveRecordRow> = sqlx::query_as(
            "SELECT * FROM archive_records WHERE pid = $1",
        )
        .bind(pid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_latest_by_work(
        &self,
        work_identifier: &str,
    ) -> IngestResult<Option<ArchiveRecord>> {
        let row: Option<ArchiveRecordRow> = sqlx::query_as(
            r#"
            SELECT * FROM archive_records
            WHERE work_identifier = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(work_identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn update_links(&self, record: &ArchiveRecord) -> IngestResult<()> {
        sqlx::query(
            r#"
            UPDATE archive_records
            SET previous_pid = $1, next_pids = $2, online_storage_id = $3
            WHERE pid = $4
            "#,
        )
        .bind(&record.previous_pid)
        .bind(&record.next_pids)
        .bind(&record.online_storage_id)
        .bind(&record.pid)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct WorkflowJobRow {
    id: Uuid,
    username: String,
    source_pid: String,
    result_pid: Option<String>,
    remote_job_id: Option<String>,
    workspace_handle: Option<String>,
    status: String,
    check_count: i32,
    workspace_deleted: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<WorkflowJobRow> for WorkflowJob {
    type Error = crate::error::IngestError;

    fn try_from(row: WorkflowJobRow) -> Result<Self, Self::Error> {
        Ok(WorkflowJob {
            id: row.id,
            username: row.username,
            source_pid: row.source_pid,
            result_pid: row.result_pid,
            remote_job_id: row.remote_job_id,
            workspace_handle: row.workspace_handle,
            status: row.status.parse()?,
            check_count: row.check_count,
            workspace_deleted: row.workspace_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed [`JobStore`]
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &WorkflowJob) -> IngestResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_jobs (
                id, username, source_pid, result_pid, remote_job_id,
                workspace_handle, status, check_count, workspace_deleted,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(job.id)
        .bind(&job.username)
        .bind(&job.source_pid)
        .bind(&job.result_pid)
        .bind(&job.remote_job_id)
        .bind(&job.workspace_handle)
        .bind(job.status.as_str())
        .bind(job.check_count)
        .bind(job.workspace_deleted)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, job: &WorkflowJob) -> IngestResult<()> {
        sqlx::query(
            r#"
            UPDATE workflow_jobs
            SET result_pid = $1, remote_job_id = $2, workspace_handle = $3,
                status = $4, check_count = $5, workspace_deleted = $6,
                updated_at = NOW()
            WHERE id = $7
            "#,
        )
        .bind(&job.result_pid)
        .bind(&job.remote_job_id)
        .bind(&job.workspace_handle)
        .bind(job.status.as_str())
        .bind(job.check_count)
        .bind(job.workspace_deleted)
        .bind(job.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> IngestResult<Option<WorkflowJob>> {
        let row: Option<WorkflowJobRow> =
            sqlx::query_as("SELECT * FROM workflow_jobs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn has_running_for_user(&self, username: &str) -> IngestResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM workflow_jobs
                WHERE username = $1 AND status = 'running'
            )
            "#,
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn find_reconcilable(&self) -> IngestResult<Vec<WorkflowJob>> {
        let rows: Vec<WorkflowJobRow> = sqlx::query_as(
            r#"
            SELECT * FROM workflow_jobs
            WHERE status IN ('running', 'unknown')
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
