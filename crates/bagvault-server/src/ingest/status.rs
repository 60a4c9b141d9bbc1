//! Per-attempt ingestion tracking state
//!
//! Every ingestion attempt leaves a status record behind: the terminal
//! state, the collected error list and the assigned identifier, keyed by
//! the spool directory the attempt came from. The extraction directory is
//! gone by the time an attempt finishes, so this record is the only place
//! failure reasons survive outside the log stream.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::IngestError;

use super::orchestrator::IngestState;

/// Terminal record of one ingestion attempt
#[derive(Debug, Clone)]
pub struct IngestStatus {
    /// Terminal state: `Done`, `Failed`, or `UnwindingFailure` when remote
    /// cleanup ran
    pub state: IngestState,
    /// Collected violation messages, or the single failure message
    pub errors: Vec<String>,
    /// Assigned identifier, present only on success
    pub pid: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl IngestStatus {
    pub(crate) fn success(pid: String) -> Self {
        Self {
            state: IngestState::Done,
            errors: Vec::new(),
            pid: Some(pid),
            finished_at: Utc::now(),
        }
    }

    pub(crate) fn failure(state: IngestState, error: &IngestError) -> Self {
        let errors = match error.violations() {
            Some(violations) => violations.to_vec(),
            None => vec![error.to_string()],
        };
        Self { state, errors, pid: None, finished_at: Utc::now() }
    }
}

/// Shared registry of attempt outcomes, keyed by bag directory.
///
/// A re-ingestion of the same directory replaces the earlier record.
#[derive(Clone, Default)]
pub struct IngestTracker {
    records: Arc<RwLock<HashMap<String, IngestStatus>>>,
}

impl IngestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, key: impl Into<String>, status: IngestStatus) {
        self.records.write().await.insert(key.into(), status);
    }

    pub async fn status(&self, key: &str) -> Option<IngestStatus> {
        self.records.read().await.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_key_has_no_status() {
        let tracker = IngestTracker::new();
        assert!(tracker.status("/spool/bag-1").await.is_none());
    }

    #[tokio::test]
    async fn test_failure_carries_all_violations() {
        let tracker = IngestTracker::new();
        let error = IngestError::ChecksumMismatch(vec!["data/a.tif".into(), "data/b.tif".into()]);
        tracker
            .record("/spool/bag-1", IngestStatus::failure(IngestState::Failed, &error))
            .await;

        let status = tracker.status("/spool/bag-1").await.unwrap();
        assert_eq!(status.state, IngestState::Failed);
        assert_eq!(status.errors, vec!["data/a.tif".to_string(), "data/b.tif".to_string()]);
        assert!(status.pid.is_none());
    }

    #[tokio::test]
    async fn test_reingestion_replaces_earlier_record() {
        let tracker = IngestTracker::new();
        let error = IngestError::InconsistentState("ghost previous version".into());
        tracker
            .record("/spool/bag-1", IngestStatus::failure(IngestState::Failed, &error))
            .await;
        tracker
            .record("/spool/bag-1", IngestStatus::success("21.11998/p1".into()))
            .await;

        let status = tracker.status("/spool/bag-1").await.unwrap();
        assert_eq!(status.state, IngestState::Done);
        assert_eq!(status.pid.as_deref(), Some("21.11998/p1"));
        assert!(status.errors.is_empty());
    }
}
