//! Ingestion orchestration
//!
//! Drives one ingestion attempt through its state machine:
//!
//! ```text
//! Validating -> IdentifierAssigned -> Uploading -> Committing
//!            -> Linking -> Notifying -> Done
//! ```
//!
//! with `Failed` the terminal of every error path and `UnwindingFailure`
//! reachable from every state past identifier assignment. The orchestrator
//! owns atomicity across the remote systems: validation runs before any
//! remote side effect, the storage transaction is always driven to commit
//! or rollback, and any failure after identifier assignment unwinds the
//! identifier and every created storage object. The local extraction
//! directory is released on every exit path; the attempt's terminal state
//! and error list survive it in the [`super::status::IngestTracker`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::bag::{Bag, KEY_IDENTIFIER, KEY_PREVIOUS_VERSION};
use crate::error::{IngestError, IngestResult};
use crate::index::IndexNotifier;
use crate::pid::PidClient;
use crate::retry::{retry_with_backoff, Backoff};
use crate::store::{ArchiveRecord, ArchiveStore};
use crate::validation::{ChecksumValidator, DescriptorValidator, StructureValidator};
use crate::vault::{StorageTransaction, TierTarget, VaultClient};
use bagvault_common::types::StorageProfile;

use super::chain::VersionChainManager;
use super::status::{IngestStatus, IngestTracker};

/// Metadata key under which the storage locator is pushed to the
/// identifier record.
const META_ONLINE_STORAGE: &str = "ONLINE-STORAGE";
const META_OFFLINE_STORAGE: &str = "OFFLINE-STORAGE";
const META_PREVIOUS_VERSION: &str = "PREVIOUS-VERSION";
const META_NEXT_VERSION: &str = "NEXT-VERSION";

/// One ingestion attempt's input
#[derive(Debug, Clone)]
pub struct IngestionRequest {
    /// Root of the extracted bag; released on every exit path
    pub bag_path: PathBuf,
    /// Explicitly declared previous-version pid, overriding both the
    /// bag-info declaration and the latest-version inference
    pub declared_previous_pid: Option<String>,
}

/// State machine of one ingestion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Validating,
    IdentifierAssigned,
    Uploading,
    Committing,
    Linking,
    Notifying,
    Done,
    UnwindingFailure,
    Failed,
}

/// Outcome of a successful ingestion
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub pid: String,
    pub record: ArchiveRecord,
}

/// Tunable policy for the orchestrator
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Whether the cold (tape) tier is in use
    pub tape_enabled: bool,
    /// Storage transaction timeout
    pub tx_timeout: Duration,
    /// Bounded retry policy for transient remote failures
    pub retry_max_attempts: u32,
    pub retry_delay: Duration,
    /// Schema resource for descriptor validation
    pub descriptor_schema_path: PathBuf,
}

/// Coordinates one ingestion attempt across validation, storage, identity
/// and the version chain
#[derive(Clone)]
pub struct IngestionOrchestrator {
    vault: VaultClient,
    pid: PidClient,
    notifier: IndexNotifier,
    store: Arc<dyn ArchiveStore>,
    chain: Arc<VersionChainManager>,
    settings: IngestSettings,
    tracker: IngestTracker,
}

impl IngestionOrchestrator {
    pub fn new(
        vault: VaultClient,
        pid: PidClient,
        notifier: IndexNotifier,
        store: Arc<dyn ArchiveStore>,
        chain: Arc<VersionChainManager>,
        settings: IngestSettings,
    ) -> Self {
        Self { vault, pid, notifier, store, chain, settings, tracker: IngestTracker::new() }
    }

    /// Tracking state left by a past attempt on this bag directory.
    pub async fn status_of(&self, bag_path: &Path) -> Option<IngestStatus> {
        self.tracker.status(&bag_path.display().to_string()).await
    }

    /// Run one ingestion attempt. The extraction directory is removed and
    /// a terminal status record is written on every exit path, success or
    /// failure.
    #[instrument(skip(self, request), fields(bag = %request.bag_path.display()))]
    pub async fn ingest(&self, request: IngestionRequest) -> IngestResult<IngestReceipt> {
        let mut state = IngestState::Validating;
        let result = self.run(&request, &mut state).await;
        let key = request.bag_path.display().to_string();

        match &result {
            Ok(receipt) => {
                info!(pid = %receipt.pid, "ingestion completed");
                self.tracker.record(key, IngestStatus::success(receipt.pid.clone())).await;
            },
            Err(e) => {
                error!(error = %e, "ingestion failed");
                // Keep UnwindingFailure visible when remote cleanup ran.
                let terminal = match state {
                    IngestState::UnwindingFailure => IngestState::UnwindingFailure,
                    _ => IngestState::Failed,
                };
                self.tracker.record(key, IngestStatus::failure(terminal, e)).await;
            },
        }

        if let Err(e) = tokio::fs::remove_dir_all(&request.bag_path).await {
            warn!(
                path = %request.bag_path.display(),
                error = %e,
                "failed to release extraction directory"
            );
        }

        result
    }

    async fn run(
        &self,
        request: &IngestionRequest,
        state: &mut IngestState,
    ) -> IngestResult<IngestReceipt> {
        Self::enter(state, IngestState::Validating);

        let bag = Bag::open(&request.bag_path)?;
        ChecksumValidator::validate(&bag)?;
        StructureValidator::validate(&bag)?;
        DescriptorValidator::new(&self.settings.descriptor_schema_path)
            .validate(&bag.descriptor_path())?;

        let work_identifier = bag
            .meta(KEY_IDENTIFIER)
            .ok_or_else(|| {
                IngestError::PackageInvalid(vec![format!("required key {KEY_IDENTIFIER} is missing")])
            })?
            .to_string();
        let fingerprint = bag.payload_fingerprint()?;

        let previous = self
            .effective_previous(request, &bag, &work_identifier, &fingerprint)
            .await?;

        // Identifier assignment is retried, but a final failure aborts
        // before any storage transaction is opened.
        let metadata = bag.metadata_pairs();
        let backoff = Backoff::Fixed(self.settings.retry_delay);
        let pid = retry_with_backoff(
            "create identifier",
            self.settings.retry_max_attempts,
            backoff,
            || self.pid.create(&metadata),
        )
        .await?;
        Self::enter(state, IngestState::IdentifierAssigned);

        let mut tx = match self.vault.begin_transaction(self.settings.tx_timeout).await {
            Ok(tx) => tx,
            Err(e) => {
                self.unwind(&pid, &[], state).await;
                return Err(e);
            },
        };

        Self::enter(state, IngestState::Uploading);
        if let Err(e) = self.upload_phase(&bag, &mut tx, previous.as_ref()).await {
            self.vault.rollback(&mut tx).await;
            self.unwind(&pid, &tx.created, state).await;
            return Err(e);
        }

        Self::enter(state, IngestState::Committing);
        if let Err(e) = self.vault.commit(&mut tx).await {
            self.vault.rollback(&mut tx).await;
            self.unwind(&pid, &tx.created, state).await;
            return Err(e);
        }

        Self::enter(state, IngestState::Linking);
        match self
            .link_phase(&bag, &tx, &pid, &work_identifier, &fingerprint, previous.as_ref())
            .await
        {
            Ok(record) => {
                Self::enter(state, IngestState::Notifying);
                self.spawn_notification(&bag, &record, previous.as_ref());
                Self::enter(state, IngestState::Done);
                Ok(IngestReceipt { pid, record })
            },
            Err(e) => {
                // The transaction is already committed; unwind deletes the
                // identifier and the committed storage objects instead.
                self.unwind(&pid, &tx.created, state).await;
                Err(e)
            },
        }
    }

    /// Determine the effective previous version and reject duplicates.
    ///
    /// An explicitly declared pid (request or bag-info) must resolve to a
    /// record. Without a declaration, the latest version of the same
    /// logical work is inferred; an inferred match with an identical
    /// payload fingerprint is a duplicate upload.
    async fn effective_previous(
        &self,
        request: &IngestionRequest,
        bag: &Bag,
        work_identifier: &str,
        fingerprint: &str,
    ) -> IngestResult<Option<ArchiveRecord>> {
        let declared = request
            .declared_previous_pid
            .clone()
            .or_else(|| bag.meta(KEY_PREVIOUS_VERSION).map(str::to_string));

        if let Some(prev_pid) = declared {
            let record = self.store.find_by_pid(&prev_pid).await?.ok_or_else(|| {
                IngestError::InconsistentState(format!(
                    "declared previous version {prev_pid} has no archive record"
                ))
            })?;
            return Ok(Some(record));
        }

        match self.store.find_latest_by_work(work_identifier).await? {
            Some(latest) if latest.payload_checksum == fingerprint => {
                Err(IngestError::DuplicatePayload {
                    work_identifier: work_identifier.to_string(),
                    pid: latest.pid,
                })
            },
            other => Ok(other),
        }
    }

    /// Create the archive shells, upload the payload, retire the previous
    /// version's online object and attach metadata, all inside the
    /// transaction.
    async fn upload_phase(
        &self,
        bag: &Bag,
        tx: &mut StorageTransaction,
        previous: Option<&ArchiveRecord>,
    ) -> IngestResult<()> {
        self.vault.create_archive(tx, StorageProfile::Online).await?;
        if self.settings.tape_enabled {
            self.vault.create_archive(tx, StorageProfile::Offline).await?;
        }

        self.vault.upload_all(tx, bag.root()).await?;

        // Only one disk-resident copy per logical work is retained; the
        // previous version survives on tape.
        if self.settings.tape_enabled {
            if let Some(prev) = previous {
                if !prev.online_storage_id.is_empty() {
                    self.vault.delete(&prev.online_storage_id, Some(&tx.id)).await?;
                }
            }
        }

        let metadata = bag.metadata_pairs();
        let tx_id = tx.id.clone();
        for target in &tx.created {
            self.vault.set_metadata(&target.storage_id, &tx_id, &metadata).await?;
        }

        Ok(())
    }

    /// Push cumulative metadata to the identity service and link the
    /// version chain. One `update` call carries everything for the new
    /// identifier; one `append` records the forward link on the previous
    /// identifier.
    async fn link_phase(
        &self,
        bag: &Bag,
        tx: &StorageTransaction,
        pid: &str,
        work_identifier: &str,
        fingerprint: &str,
        previous: Option<&ArchiveRecord>,
    ) -> IngestResult<ArchiveRecord> {
        let online_id = tx
            .storage_id(StorageProfile::Online)
            .ok_or_else(|| IngestError::InconsistentState("no online archive created".into()))?
            .to_string();
        let offline_id = tx.storage_id(StorageProfile::Offline).map(str::to_string);

        let mut metadata = bag.metadata_pairs();
        metadata.push((META_ONLINE_STORAGE.to_string(), online_id.clone()));
        if let Some(offline) = &offline_id {
            metadata.push((META_OFFLINE_STORAGE.to_string(), offline.clone()));
        }
        if let Some(prev) = previous {
            metadata.push((META_PREVIOUS_VERSION.to_string(), prev.pid.clone()));
        }

        let backoff = Backoff::Fixed(self.settings.retry_delay);
        retry_with_backoff("update identifier", self.settings.retry_max_attempts, backoff, || {
            self.pid.update(pid, &metadata)
        })
        .await?;

        if let Some(prev) = previous {
            let forward = vec![(META_NEXT_VERSION.to_string(), pid.to_string())];
            retry_with_backoff(
                "append forward link",
                self.settings.retry_max_attempts,
                backoff,
                || self.pid.append(&prev.pid, &forward),
            )
            .await?;
        }

        let record = ArchiveRecord::new(
            pid.to_string(),
            online_id,
            offline_id,
            work_identifier.to_string(),
            fingerprint.to_string(),
        );
        self.chain.link(record, previous.map(|p| p.pid.as_str())).await
    }

    /// Fire the best-effort index notification asynchronously. The
    /// ingestion is already durable; a notification failure is only logged.
    fn spawn_notification(&self, bag: &Bag, record: &ArchiveRecord, previous: Option<&ArchiveRecord>) {
        let vault = self.vault.clone();
        let notifier = self.notifier.clone();
        let online_id = record.online_storage_id.clone();
        let descriptor = bag.descriptor_relative_path();
        let pid = record.pid.clone();
        let prev_pid = previous.map(|p| p.pid.clone());

        tokio::spawn(async move {
            if let Err(e) = notifier
                .notify(&vault, &online_id, &descriptor, &pid, prev_pid.as_deref())
                .await
            {
                warn!(pid = %pid, error = %e, "index notification failed");
            }
        });
    }

    /// Best-effort unwind: delete the assigned identifier and every
    /// created storage object. Cleanup failures are logged, never allowed
    /// to mask the original failure.
    async fn unwind(&self, pid: &str, created: &[TierTarget], state: &mut IngestState) {
        Self::enter(state, IngestState::UnwindingFailure);

        for target in created {
            if let Err(e) = self.vault.delete(&target.storage_id, None).await {
                warn!(storage_id = %target.storage_id, error = %e, "unwind: archive delete failed");
            }
        }

        if let Err(e) = self.pid.delete(pid).await {
            warn!(pid, error = %e, "unwind: identifier delete failed");
        }
    }

    fn enter(state: &mut IngestState, next: IngestState) {
        debug!(state = ?next, "ingestion state");
        *state = next;
    }
}
