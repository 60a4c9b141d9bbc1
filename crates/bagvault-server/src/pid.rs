//! Persistent identifier service client
//!
//! Mints, updates, appends to and deletes persistent identifiers for
//! archived works. Metadata travels as ordered `(key, value)` pairs.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{IngestError, IngestResult};

/// Default timeout for identifier service requests in seconds.
pub const DEFAULT_PID_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize, Deserialize)]
struct MetaPair {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct PidResponse {
    pid: String,
}

/// Client for the persistent identifier service
#[derive(Clone)]
pub struct PidClient {
    client: Client,
    base_url: String,
    prefix: String,
}

impl PidClient {
    pub fn new(base_url: String, prefix: String) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_PID_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client, base_url, prefix })
    }

    /// Mint a new identifier carrying the given metadata.
    #[instrument(skip(self, metadata))]
    pub async fn create(&self, metadata: &[(String, String)]) -> IngestResult<String> {
        let response = self
            .client
            .post(format!("{}/pids", self.base_url))
            .query(&[("prefix", self.prefix.as_str())])
            .json(&to_pairs(metadata))
            .send()
            .await?;

        let response = check(response, "create identifier")?;
        let body: PidResponse = response.json().await?;
        debug!(pid = %body.pid, "identifier minted");
        Ok(body.pid)
    }

    /// Replace the metadata of an existing identifier.
    #[instrument(skip(self, metadata))]
    pub async fn update(&self, pid: &str, metadata: &[(String, String)]) -> IngestResult<()> {
        let response = self
            .client
            .put(format!("{}/pids/{pid}", self.base_url))
            .json(&to_pairs(metadata))
            .send()
            .await?;

        check(response, "update identifier")?;
        Ok(())
    }

    /// Append metadata to an existing identifier without replacing what is
    /// already recorded.
    #[instrument(skip(self, metadata))]
    pub async fn append(&self, pid: &str, metadata: &[(String, String)]) -> IngestResult<()> {
        let response = self
            .client
            .patch(format!("{}/pids/{pid}", self.base_url))
            .json(&to_pairs(metadata))
            .send()
            .await?;

        check(response, "append identifier data")?;
        Ok(())
    }

    /// Delete an identifier. Used only by the unwind path.
    #[instrument(skip(self))]
    pub async fn delete(&self, pid: &str) -> IngestResult<()> {
        let response = self
            .client
            .delete(format!("{}/pids/{pid}", self.base_url))
            .send()
            .await?;

        check(response, "delete identifier")?;
        Ok(())
    }
}

fn to_pairs(metadata: &[(String, String)]) -> Vec<MetaPair> {
    metadata
        .iter()
        .map(|(key, value)| MetaPair { key: key.clone(), value: value.clone() })
        .collect()
}

fn check(response: reqwest::Response, operation: &'static str) -> IngestResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(IngestError::RemoteStorage { status: status.as_u16(), operation })
    }
}
