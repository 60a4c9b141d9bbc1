//! Version chain linkage
//!
//! Links a freshly ingested record to its previous version. Two ingestions
//! naming the same previous pid serialize on that pid's lock; ingestions of
//! unrelated works never contend. The lock covers exactly the
//! read-modify-write of the two involved records against the local store
//! and is never held across a remote network call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, instrument};

use crate::error::{IngestError, IngestResult};
use crate::store::{ArchiveRecord, ArchiveStore};

/// Arena of per-pid locks, created lazily and never removed. The registry
/// stays small: one entry per previous-version pid ever linked against.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for a key, creating it on first use.
    pub fn get(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }
}

/// Maintains the previous/next-version graph under concurrent imports
pub struct VersionChainManager {
    store: Arc<dyn ArchiveStore>,
    locks: KeyedLocks,
}

impl VersionChainManager {
    pub fn new(store: Arc<dyn ArchiveStore>) -> Self {
        Self { store, locks: KeyedLocks::new() }
    }

    /// Persist a new record and link it behind `previous_pid`.
    ///
    /// Under the previous pid's lock: loads the previous record, sets the
    /// new record's back reference, clears the previous record's online
    /// storage id (only one disk-resident copy per logical work is
    /// retained), appends the new pid to the previous record's forward
    /// list, and persists both records.
    #[instrument(skip(self, record), fields(pid = %record.pid))]
    pub async fn link(
        &self,
        mut record: ArchiveRecord,
        previous_pid: Option<&str>,
    ) -> IngestResult<ArchiveRecord> {
        let Some(prev_pid) = previous_pid else {
            self.store.insert(&record).await?;
            debug!("first version of work, no chain linkage");
            return Ok(record);
        };

        let lock = self.locks.get(prev_pid);
        let _guard = lock.lock().await;

        let mut previous = self
            .store
            .find_by_pid(prev_pid)
            .await?
            .ok_or_else(|| {
                IngestError::InconsistentState(format!(
                    "previous version {prev_pid} has no archive record"
                ))
            })?;

        record.previous_pid = Some(prev_pid.to_string());
        self.store.insert(&record).await?;

        previous.online_storage_id.clear();
        if !previous.next_pids.contains(&record.pid) {
            previous.next_pids.push(record.pid.clone());
        }
        self.store.update_links(&previous).await?;

        debug!(previous = prev_pid, "version chain linked");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryArchiveStore;

    fn record(pid: &str, work: &str) -> ArchiveRecord {
        ArchiveRecord::new(pid.into(), format!("arc-{pid}"), None, work.into(), "sum".into())
    }

    #[tokio::test]
    async fn test_link_without_previous() {
        let store = Arc::new(MemoryArchiveStore::new());
        let chain = VersionChainManager::new(store.clone());

        let linked = chain.link(record("pid-1", "w"), None).await.unwrap();
        assert!(linked.previous_pid.is_none());
        assert!(store.find_by_pid("pid-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_link_updates_both_records() {
        let store = Arc::new(MemoryArchiveStore::new());
        let chain = VersionChainManager::new(store.clone());

        chain.link(record("pid-1", "w"), None).await.unwrap();
        let linked = chain.link(record("pid-2", "w"), Some("pid-1")).await.unwrap();

        assert_eq!(linked.previous_pid.as_deref(), Some("pid-1"));

        let previous = store.find_by_pid("pid-1").await.unwrap().unwrap();
        assert_eq!(previous.online_storage_id, "");
        assert_eq!(previous.next_pids, vec!["pid-2".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_previous_is_inconsistent_state() {
        let store = Arc::new(MemoryArchiveStore::new());
        let chain = VersionChainManager::new(store);

        let err = chain.link(record("pid-2", "w"), Some("ghost")).await.unwrap_err();
        assert!(matches!(err, IngestError::InconsistentState(_)));
    }

    #[tokio::test]
    async fn test_concurrent_links_to_same_previous_lose_no_update() {
        let store = Arc::new(MemoryArchiveStore::new());
        let chain = Arc::new(VersionChainManager::new(store.clone()));

        chain.link(record("pid-1", "w"), None).await.unwrap();

        let mut handles = Vec::new();
        for i in 2..=9 {
            let chain = chain.clone();
            handles.push(tokio::spawn(async move {
                chain
                    .link(record(&format!("pid-{i}"), "w"), Some("pid-1"))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let previous = store.find_by_pid("pid-1").await.unwrap().unwrap();
        assert_eq!(previous.next_pids.len(), 8);
        for i in 2..=9 {
            let pid = format!("pid-{i}");
            assert_eq!(previous.next_pids.iter().filter(|p| **p == pid).count(), 1);
        }
    }

    #[tokio::test]
    async fn test_branching_is_allowed() {
        // The graph is not forced to stay linear: two new versions may both
        // name the same previous version.
        let store = Arc::new(MemoryArchiveStore::new());
        let chain = VersionChainManager::new(store.clone());

        chain.link(record("pid-1", "w"), None).await.unwrap();
        chain.link(record("pid-2a", "w"), Some("pid-1")).await.unwrap();
        chain.link(record("pid-2b", "w"), Some("pid-1")).await.unwrap();

        let previous = store.find_by_pid("pid-1").await.unwrap().unwrap();
        assert_eq!(previous.next_pids, vec!["pid-2a".to_string(), "pid-2b".to_string()]);
    }
}
