//! Inbox spool scanner
//!
//! Watches a spool directory for extracted bags and feeds them to the
//! ingestion orchestrator. Each bag is a subdirectory; the scanner claims
//! one by renaming it with a `.ingesting` suffix before touching it, so a
//! crashed or overlapping scan never processes the same bag twice. The
//! orchestrator releases the claimed directory on every exit path.

use std::path::PathBuf;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::IngestResult;

use super::orchestrator::{IngestionOrchestrator, IngestionRequest};

/// Suffix marking a spool directory as claimed by a scan.
const CLAIM_SUFFIX: &str = ".ingesting";

/// Periodically drains a spool directory of extracted bags
pub struct InboxScanner {
    inbox_dir: PathBuf,
    scan_interval: Duration,
    orchestrator: IngestionOrchestrator,
}

impl InboxScanner {
    pub fn new(
        inbox_dir: impl Into<PathBuf>,
        scan_interval: Duration,
        orchestrator: IngestionOrchestrator,
    ) -> Self {
        Self { inbox_dir: inbox_dir.into(), scan_interval, orchestrator }
    }

    /// Run the scan loop until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(inbox = %self.inbox_dir.display(), "inbox scanner started");

            let mut ticker = interval(self.scan_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = self.scan_once().await {
                    error!(error = %e, "inbox scan failed");
                }
            }
        })
    }

    /// Drain the spool once: claim every unclaimed bag directory, then
    /// ingest them one at a time. A failed ingestion is logged and does not
    /// stop the rest of the scan. Returns the number of successful
    /// ingestions.
    pub async fn scan_once(&self) -> IngestResult<usize> {
        let mut claimed = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.inbox_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || name.ends_with(CLAIM_SUFFIX) {
                continue;
            }

            let claimed_path = self.inbox_dir.join(format!("{name}{CLAIM_SUFFIX}"));
            match tokio::fs::rename(entry.path(), &claimed_path).await {
                Ok(()) => {
                    debug!(bag = %name, "claimed spool directory");
                    claimed.push(claimed_path);
                },
                // Lost the race against a concurrent claim; skip it.
                Err(e) => {
                    warn!(bag = %name, error = %e, "could not claim spool directory");
                },
            }
        }

        let mut ingested = 0usize;
        for bag_path in claimed {
            let request =
                IngestionRequest { bag_path: bag_path.clone(), declared_previous_pid: None };
            match self.orchestrator.ingest(request).await {
                Ok(receipt) => {
                    info!(pid = %receipt.pid, "spooled bag ingested");
                    ingested += 1;
                },
                // The orchestrator recorded the failure in its tracking
                // state and released the directory.
                Err(e) => {
                    warn!(bag = %bag_path.display(), error = %e, "spooled bag rejected");
                },
            }
        }

        Ok(ingested)
    }
}
