//! In-memory store implementations
//!
//! Used by tests. Behavior mirrors the Postgres implementations, including
//! the unique-pid constraint.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{IngestError, IngestResult};

use super::{ArchiveRecord, ArchiveStore, JobStatus, JobStore, WorkflowJob};

/// In-memory [`ArchiveStore`], keyed by pid
#[derive(Clone, Default)]
pub struct MemoryArchiveStore {
    records: Arc<RwLock<HashMap<String, ArchiveRecord>>>,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn insert(&self, record: &ArchiveRecord) -> IngestResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.pid) {
            return Err(IngestError::InconsistentState(format!(
                "pid {} already recorded",
                record.pid
            )));
        }
        records.insert(record.pid.clone(), record.clone());
        Ok(())
    }

    async fn find_by_pid(&self, pid: &str) -> IngestResult<Option<ArchiveRecord>> {
        Ok(self.records.read().await.get(pid).cloned())
    }

    async fn find_latest_by_work(
        &self,
        work_identifier: &str,
    ) -> IngestResult<Option<ArchiveRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.work_identifier == work_identifier)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn update_links(&self, record: &ArchiveRecord) -> IngestResult<()> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.pid) {
            Some(existing) => {
                existing.previous_pid = record.previous_pid.clone();
                existing.next_pids = record.next_pids.clone();
                existing.online_storage_id = record.online_storage_id.clone();
                Ok(())
            },
            None => Err(IngestError::InconsistentState(format!(
                "cannot update unknown pid {}",
                record.pid
            ))),
        }
    }
}

/// In-memory [`JobStore`]
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<Uuid, WorkflowJob>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &WorkflowJob) -> IngestResult<()> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn update(&self, job: &WorkflowJob) -> IngestResult<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            },
            None => Err(IngestError::InconsistentState(format!(
                "cannot update unknown job {}",
                job.id
            ))),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> IngestResult<Option<WorkflowJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn has_running_for_user(&self, username: &str) -> IngestResult<bool> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .any(|j| j.username == username && j.status == JobStatus::Running))
    }

    async fn find_reconcilable(&self) -> IngestResult<Vec<WorkflowJob>> {
        let mut jobs: Vec<WorkflowJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| matches!(j.status, JobStatus::Running | JobStatus::Unknown))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: &str, work: &str) -> ArchiveRecord {
        ArchiveRecord::new(pid.into(), "arc".into(), None, work.into(), "sum".into())
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_pid() {
        let store = MemoryArchiveStore::new();
        store.insert(&record("pid-1", "w")).await.unwrap();
        assert!(store.insert(&record("pid-1", "w")).await.is_err());
    }

    #[tokio::test]
    async fn test_find_latest_by_work() {
        let store = MemoryArchiveStore::new();
        let mut first = record("pid-1", "w");
        first.created_at = chrono::Utc::now() - chrono::Duration::minutes(5);
        store.insert(&first).await.unwrap();
        store.insert(&record("pid-2", "w")).await.unwrap();
        store.insert(&record("pid-3", "other")).await.unwrap();

        let latest = store.find_latest_by_work("w").await.unwrap().unwrap();
        assert_eq!(latest.pid, "pid-2");
    }

    #[tokio::test]
    async fn test_update_links_persists() {
        let store = MemoryArchiveStore::new();
        let mut rec = record("pid-1", "w");
        store.insert(&rec).await.unwrap();

        rec.online_storage_id = String::new();
        rec.next_pids.push("pid-2".into());
        store.update_links(&rec).await.unwrap();

        let reloaded = store.find_by_pid("pid-1").await.unwrap().unwrap();
        assert_eq!(reloaded.online_storage_id, "");
        assert_eq!(reloaded.next_pids, vec!["pid-2".to_string()]);
    }

    #[tokio::test]
    async fn test_running_job_lookup() {
        let store = MemoryJobStore::new();
        let mut job = WorkflowJob::new("alice".into(), "pid-1".into());
        job.status = JobStatus::Running;
        store.insert(&job).await.unwrap();

        assert!(store.has_running_for_user("alice").await.unwrap());
        assert!(!store.has_running_for_user("bob").await.unwrap());
        assert_eq!(store.find_reconcilable().await.unwrap().len(), 1);
    }
}
