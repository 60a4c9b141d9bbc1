//! External indexer notification
//!
//! After a commit, the indexer is told about the new version with a single
//! small JSON document. The data it will read must actually be retrievable
//! first, so the notifier polls the online tier for the committed
//! descriptor file with capped exponential backoff before posting. The
//! whole notification is best-effort: the ingestion is already durable when
//! it runs, so neither a poll timeout nor a failed POST fails the ingestion.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

use crate::error::IngestResult;
use crate::vault::VaultClient;

/// Initial delay between visibility polls.
const POLL_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Cap on the delay between visibility polls.
const POLL_MAX_DELAY: Duration = Duration::from_secs(8);

/// Notifies the external indexer about committed versions
#[derive(Clone)]
pub struct IndexNotifier {
    client: Client,
    url: String,
    context: String,
    product: String,
    /// Cap on the total duration of the visibility poll
    poll_cap: Duration,
}

impl IndexNotifier {
    pub fn new(
        url: String,
        context: String,
        product: String,
        poll_cap: Duration,
    ) -> IngestResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, url, context, product, poll_cap })
    }

    /// Wait for the descriptor to become retrievable, then post the
    /// notification. Gives up silently when the poll cap elapses.
    #[instrument(skip(self, vault))]
    pub async fn notify(
        &self,
        vault: &VaultClient,
        online_storage_id: &str,
        descriptor_path: &str,
        pid: &str,
        previous_pid: Option<&str>,
    ) -> IngestResult<()> {
        if !self.wait_until_visible(vault, online_storage_id, descriptor_path).await {
            warn!(
                pid,
                descriptor_path,
                "descriptor not retrievable within poll cap, skipping index notification"
            );
            return Ok(());
        }

        let document = json!({
            "document": pid,
            "context": self.context,
            "product": self.product,
            "prev": previous_pid.unwrap_or(""),
        });

        let response = self.client.post(&self.url).json(&document).send().await?;
        if response.status().is_success() {
            info!(pid, "indexer notified");
        } else {
            warn!(pid, status = %response.status(), "indexer rejected notification");
        }
        Ok(())
    }

    /// Poll with capped exponential backoff until the descriptor is
    /// retrievable or the total poll cap elapses.
    async fn wait_until_visible(
        &self,
        vault: &VaultClient,
        storage_id: &str,
        descriptor_path: &str,
    ) -> bool {
        let started = Instant::now();
        let mut delay = POLL_INITIAL_DELAY;

        loop {
            match vault.exists(storage_id, descriptor_path).await {
                Ok(true) => return true,
                Ok(false) => {
                    debug!(storage_id, descriptor_path, "descriptor not yet visible");
                },
                Err(e) => {
                    debug!(storage_id, error = %e, "visibility check failed");
                },
            }

            if started.elapsed() + delay > self.poll_cap {
                return false;
            }
            sleep(delay).await;
            delay = (delay * 2).min(POLL_MAX_DELAY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn vault(server: &MockServer) -> VaultClient {
        VaultClient::new(server.uri(), vec![]).unwrap()
    }

    fn notifier(server: &MockServer, cap: Duration) -> IndexNotifier {
        IndexNotifier::new(
            format!("{}/notify", server.uri()),
            "ocrd".into(),
            "bagvault".into(),
            cap,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_notifies_once_descriptor_visible() {
        let server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/archives/arc-1/data/mets.xml"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .and(body_json(serde_json::json!({
                "document": "pid-2",
                "context": "ocrd",
                "product": "bagvault",
                "prev": "pid-1",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server, Duration::from_secs(5))
            .notify(&vault(&server), "arc-1", "data/mets.xml", "pid-2", Some("pid-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_prev_defaults_to_empty_string() {
        let server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .and(body_json(serde_json::json!({
                "document": "pid-1",
                "context": "ocrd",
                "product": "bagvault",
                "prev": "",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server, Duration::from_secs(5))
            .notify(&vault(&server), "arc-1", "data/mets.xml", "pid-1", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_gives_up_when_never_visible() {
        let server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        // Zero cap: one failed check, then give up without notifying.
        notifier(&server, Duration::ZERO)
            .notify(&vault(&server), "arc-1", "data/mets.xml", "pid-1", None)
            .await
            .unwrap();
    }
}
