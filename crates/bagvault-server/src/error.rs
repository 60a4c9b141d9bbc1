//! Server-specific error types
//!
//! The ingestion pipeline distinguishes four broad failure classes:
//!
//! - validation failures (structural, checksum, descriptor) — never retried,
//!   always carry the full list of violations
//! - duplicate payloads — reported, never retried
//! - transient remote failures (5xx, connect errors) — retried up to a
//!   bounded count, then escalated
//! - configuration failures (missing schema resource) — fatal, surfaced
//!   immediately

use thiserror::Error;

/// Result type alias for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Error type covering the whole ingestion and workflow pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("package invalid: {}", .0.join("; "))]
    PackageInvalid(Vec<String>),

    #[error("checksum mismatches: {}", .0.join(", "))]
    ChecksumMismatch(Vec<String>),

    #[error("manifest missing: {0}")]
    ManifestMissing(String),

    #[error("descriptor invalid: {0}")]
    DescriptorInvalid(String),

    #[error("duplicate payload for work {work_identifier} (previous version {pid})")]
    DuplicatePayload { work_identifier: String, pid: String },

    #[error("remote storage error during {operation}: HTTP {status}")]
    RemoteStorage { status: u16, operation: &'static str },

    #[error("remote service unreachable: {0}")]
    RemoteUnreachable(#[from] reqwest::Error),

    #[error("not found: {0}")]
    RemoteNotFound(String),

    #[error("inconsistent state: {0}")]
    InconsistentState(String),

    #[error("user {username} already has a running job")]
    JobAlreadyRunning { username: String },

    #[error("archive {0} is not disk-resident; stage it from tape first")]
    NotDiskResident(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("common error: {0}")]
    Common(#[from] bagvault_common::BagvaultError),

    #[error("ingestion failed: {0}")]
    IngestionFailed(String),
}

impl IngestError {
    /// Whether this error class may succeed on a retry.
    ///
    /// Validation failures, duplicates and 4xx responses never do; network
    /// errors and 5xx responses from the remote services may.
    pub fn is_transient(&self) -> bool {
        match self {
            IngestError::RemoteStorage { status, .. } => *status >= 500,
            IngestError::RemoteUnreachable(e) => {
                e.is_connect() || e.is_timeout() || e.status().map_or(true, |s| s.is_server_error())
            },
            IngestError::Database(_) => true,
            _ => false,
        }
    }

    /// Collected violation messages for validation failures, if any
    pub fn violations(&self) -> Option<&[String]> {
        match self {
            IngestError::PackageInvalid(v) | IngestError::ChecksumMismatch(v) => Some(v),
            _ => None,
        }
    }
}
