//! Tiered archive storage client
//!
//! Client for the remote object-archive service. The service exposes named
//! storage profiles ("online" disk, "offline" tape, "mirror" staging) and a
//! transaction concept: archives created and files uploaded under an open
//! transaction become visible only on commit.
//!
//! The client performs no retries and no rollback on its own; any
//! unsuccessful response surfaces as [`IngestError::RemoteStorage`] and the
//! ingestion orchestrator owns the rollback/retry policy.

mod media;
mod metadata;

pub use media::media_type_for;
pub use metadata::map_metadata;

use std::path::Path;
use std::time::Duration;

use reqwest::{Body, Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use bagvault_common::types::StorageProfile;

use crate::error::{IngestError, IngestResult};

/// Default timeout for storage requests in seconds. Uploads of large
/// payload files dominate, hence the generous value.
pub const DEFAULT_VAULT_TIMEOUT_SECS: u64 = 600;

/// One archive shell created under a transaction
#[derive(Debug, Clone)]
pub struct TierTarget {
    pub profile: StorageProfile,
    pub storage_id: String,
}

/// Ephemeral handle for one open storage transaction.
///
/// Tracks the archive shells created so far so the orchestrator can unwind
/// them; dropped without commit means the orchestrator must roll back.
#[derive(Debug, Clone, Default)]
pub struct StorageTransaction {
    pub id: String,
    pub created: Vec<TierTarget>,
    pub closed: bool,
}

impl StorageTransaction {
    pub fn storage_id(&self, profile: StorageProfile) -> Option<&str> {
        self.created
            .iter()
            .find(|t| t.profile == profile)
            .map(|t| t.storage_id.as_str())
    }
}

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Vec<IdResponse>,
}

#[derive(Deserialize)]
struct ArchiveInfo {
    state: String,
}

/// Client for the tiered archive storage service
#[derive(Clone)]
pub struct VaultClient {
    client: Client,
    base_url: String,
    /// Media types routed exclusively to the offline tier
    offline_media_types: Vec<String>,
}

impl VaultClient {
    pub fn new(base_url: String, offline_media_types: Vec<String>) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_VAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client, base_url, offline_media_types })
    }

    // ========================================================================
    // Transaction protocol
    // ========================================================================

    /// Open a storage transaction with the given timeout.
    #[instrument(skip(self))]
    pub async fn begin_transaction(&self, timeout: Duration) -> IngestResult<StorageTransaction> {
        let response = self
            .client
            .post(format!("{}/transactions", self.base_url))
            .json(&json!({ "timeout": timeout.as_secs() }))
            .send()
            .await?;

        let response = check(response, "begin_transaction")?;
        let body: IdResponse = response.json().await?;

        debug!(tx = %body.id, "storage transaction opened");
        Ok(StorageTransaction { id: body.id, created: Vec::new(), closed: false })
    }

    /// Create one archive shell in the given profile under the transaction.
    #[instrument(skip(self, tx), fields(tx = %tx.id))]
    pub async fn create_archive(
        &self,
        tx: &mut StorageTransaction,
        profile: StorageProfile,
    ) -> IngestResult<String> {
        let response = self
            .client
            .post(format!("{}/archives", self.base_url))
            .query(&[("profile", profile.as_str())])
            .header("X-Transaction", &tx.id)
            .send()
            .await?;

        let response = check(response, "create_archive")?;
        let body: IdResponse = response.json().await?;

        debug!(storage_id = %body.id, %profile, "archive shell created");
        tx.created.push(TierTarget { profile, storage_id: body.id.clone() });
        Ok(body.id)
    }

    /// Upload every regular file under `root` into the created archives.
    ///
    /// When an offline (tape) target exists, files whose media type is in
    /// the configured offline-only set go exclusively to tape; everything
    /// else goes to every target. Any single upload failure is fatal to the
    /// transaction.
    #[instrument(skip(self, tx, root), fields(tx = %tx.id))]
    pub async fn upload_all(&self, tx: &StorageTransaction, root: &Path) -> IngestResult<()> {
        let has_offline = tx.storage_id(StorageProfile::Offline).is_some();
        let mut uploaded = 0usize;

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| {
                IngestError::IngestionFailed(format!("cannot walk {}: {e}", root.display()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path
                .strip_prefix(root)
                .map_err(|e| IngestError::IngestionFailed(e.to_string()))?
                .to_string_lossy()
                .replace('\\', "/");
            let media_type = media_type_for(path);
            let offline_only = has_offline && self.offline_media_types.iter().any(|t| t == media_type);

            for target in &tx.created {
                if offline_only && target.profile != StorageProfile::Offline {
                    continue;
                }
                self.upload_file(&tx.id, &target.storage_id, &relative, path, media_type)
                    .await?;
            }
            uploaded += 1;
        }

        info!(files = uploaded, "payload uploaded to all tiers");
        Ok(())
    }

    /// PUT one file, streaming it from disk rather than buffering it.
    async fn upload_file(
        &self,
        tx_id: &str,
        storage_id: &str,
        relative: &str,
        path: &Path,
        media_type: &'static str,
    ) -> IngestResult<()> {
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();

        let response = self
            .client
            .put(self.archive_file_url(storage_id, relative)?)
            .header("X-Transaction", tx_id)
            .header(reqwest::header::CONTENT_TYPE, media_type)
            .header(reqwest::header::CONTENT_LENGTH, length)
            .body(Body::from(file))
            .send()
            .await?;

        check(response, "upload_file")?;
        Ok(())
    }

    /// Build the URL of a file inside an archive, percent-encoding every
    /// path segment. Payload filenames may contain characters like `#` or
    /// `?` that would otherwise cut the path short.
    fn archive_file_url(&self, storage_id: &str, relative: &str) -> IngestResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| IngestError::Configuration(format!("invalid storage base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| IngestError::Configuration("storage base url cannot be a base".into()))?
            .pop_if_empty()
            .extend(["archives", storage_id])
            .extend(relative.split('/'));
        Ok(url)
    }

    /// Attach mapped metadata to an archive under the transaction.
    ///
    /// Keys are matched case-insensitively with dotted or hyphenated
    /// spellings; unrecognized keys are dropped.
    #[instrument(skip(self, pairs))]
    pub async fn set_metadata(
        &self,
        storage_id: &str,
        tx_id: &str,
        pairs: &[(String, String)],
    ) -> IngestResult<()> {
        let mapped = map_metadata(pairs);
        if mapped.is_empty() {
            debug!(storage_id, "no recognized metadata keys, skipping");
            return Ok(());
        }

        let response = self
            .client
            .post(format!("{}/archives/{storage_id}/metadata", self.base_url))
            .header("X-Transaction", tx_id)
            .json(&mapped)
            .send()
            .await?;

        check(response, "set_metadata")?;
        Ok(())
    }

    /// Commit the transaction. Only called after all uploads and metadata
    /// writes succeeded.
    #[instrument(skip(self, tx), fields(tx = %tx.id))]
    pub async fn commit(&self, tx: &mut StorageTransaction) -> IngestResult<()> {
        let response = self
            .client
            .post(format!("{}/transactions/{}", self.base_url, tx.id))
            .send()
            .await?;

        check(response, "commit")?;
        tx.closed = true;
        info!(tx = %tx.id, "storage transaction committed");
        Ok(())
    }

    /// Roll back the transaction. Best-effort: failures are logged, never
    /// re-raised, so a rollback error cannot mask the original failure.
    #[instrument(skip(self, tx), fields(tx = %tx.id))]
    pub async fn rollback(&self, tx: &mut StorageTransaction) {
        if tx.closed {
            return;
        }
        tx.closed = true;

        let result = self
            .client
            .delete(format!("{}/transactions/{}", self.base_url, tx.id))
            .send()
            .await;

        match result.map(|r| r.status()) {
            Ok(status) if status.is_success() => {
                info!(tx = %tx.id, "storage transaction rolled back");
            },
            Ok(status) => {
                warn!(tx = %tx.id, %status, "storage rollback rejected");
            },
            Err(e) => {
                warn!(tx = %tx.id, error = %e, "storage rollback failed");
            },
        }
    }

    // ========================================================================
    // Tier migration and lookup (independent of the transaction protocol)
    // ========================================================================

    /// Stage a tape-resident archive back to disk (offline -> mirror).
    pub async fn move_tape_to_disk(&self, pid: &str) -> IngestResult<String> {
        self.migrate(pid, StorageProfile::Offline, StorageProfile::Mirror).await
    }

    /// Evict a staged archive from disk back to tape (mirror -> offline).
    pub async fn move_disk_to_tape(&self, pid: &str) -> IngestResult<String> {
        self.migrate(pid, StorageProfile::Mirror, StorageProfile::Offline).await
    }

    #[instrument(skip(self))]
    async fn migrate(
        &self,
        pid: &str,
        from: StorageProfile,
        to: StorageProfile,
    ) -> IngestResult<String> {
        let storage_id = self
            .resolve_storage_id(pid, from)
            .await?
            .ok_or_else(|| IngestError::RemoteNotFound(format!("{pid} in profile {from}")))?;

        let response = self
            .client
            .put(format!("{}/archives/{storage_id}/profile", self.base_url))
            .json(&json!({ "profile": to.as_str() }))
            .send()
            .await?;

        check(response, "migrate")?;
        info!(%pid, %from, %to, "archive migrated between tiers");
        Ok(storage_id)
    }

    /// Whether the archive's tier is disk-resident (open) as opposed to
    /// archived on tape.
    #[instrument(skip(self))]
    pub async fn is_open(&self, storage_id: &str) -> IngestResult<bool> {
        let response = self
            .client
            .get(format!("{}/archives/{storage_id}/info", self.base_url))
            .send()
            .await?;

        let response = check(response, "is_open")?;
        let info: ArchiveInfo = response.json().await?;
        Ok(info.state == "open")
    }

    /// Resolve the most recently modified archive for a logical identifier
    /// within one profile. `None` is a normal negative result.
    #[instrument(skip(self))]
    pub async fn resolve_storage_id(
        &self,
        pid: &str,
        profile: StorageProfile,
    ) -> IngestResult<Option<String>> {
        let query = format!("{pid} AND profile:{profile}");
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query.as_str()), ("order", "-modified"), ("limit", "1")])
            .send()
            .await?;

        let response = check(response, "resolve_storage_id")?;
        let body: SearchResponse = response.json().await?;
        Ok(body.hits.into_iter().next().map(|h| h.id))
    }

    /// Delete an archive, optionally inside a transaction. Idempotent: a
    /// 404 from the remote service is not an error.
    #[instrument(skip(self))]
    pub async fn delete(&self, storage_id: &str, tx_id: Option<&str>) -> IngestResult<()> {
        let mut request = self
            .client
            .delete(format!("{}/archives/{storage_id}", self.base_url));
        if let Some(tx) = tx_id {
            request = request.header("X-Transaction", tx);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(storage_id, "archive already gone");
            return Ok(());
        }
        check(response, "delete")?;
        Ok(())
    }

    // ========================================================================
    // Reads (used by the visibility poll and the workflow orchestrator)
    // ========================================================================

    /// Whether a file inside an archive is retrievable.
    pub async fn exists(&self, storage_id: &str, relative: &str) -> IngestResult<bool> {
        let response = self
            .client
            .head(self.archive_file_url(storage_id, relative)?)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(IngestError::RemoteStorage { status: s.as_u16(), operation: "exists" }),
        }
    }

    /// Export a whole archive as a single packaged download.
    #[instrument(skip(self))]
    pub async fn export(&self, storage_id: &str) -> IngestResult<Vec<u8>> {
        let response = self
            .client
            .get(format!("{}/archives/{storage_id}/export", self.base_url))
            .send()
            .await?;

        let response = check(response, "export")?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Map a non-success response to `RemoteStorage` with the failing operation.
fn check(response: reqwest::Response, operation: &'static str) -> IngestResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(IngestError::RemoteStorage { status: status.as_u16(), operation })
    }
}
