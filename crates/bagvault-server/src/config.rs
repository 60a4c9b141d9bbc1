//! Configuration management

use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/bagvault";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default base URL of the tiered archive storage service.
pub const DEFAULT_VAULT_URL: &str = "http://localhost:8082";

/// Default storage transaction timeout in seconds.
pub const DEFAULT_VAULT_TX_TIMEOUT_SECS: u64 = 300;

/// Media types routed exclusively to the offline (tape) tier.
pub const DEFAULT_OFFLINE_MEDIA_TYPES: &str = "image/tiff,image/jp2";

/// Default base URL of the persistent identifier service.
pub const DEFAULT_PID_SERVICE_URL: &str = "http://localhost:8083";

/// Default base URL of the external indexer notification endpoint.
pub const DEFAULT_INDEXER_URL: &str = "http://localhost:8084/notify";

/// Default base URL of the external workflow processor.
pub const DEFAULT_WORKFLOW_URL: &str = "http://localhost:8085";

/// Default import endpoint the processor pushes finished results to.
pub const DEFAULT_WORKFLOW_RESULT_URL: &str = "http://localhost:8080/import";

/// Default number of attempts for transient remote failures.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Default delay between retry attempts in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;

/// Default cap on the post-commit descriptor visibility poll in seconds.
pub const DEFAULT_VISIBILITY_POLL_CAP_SECS: u64 = 120;

/// Default reconciliation loop interval in seconds.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;

/// Default delay before the first reconciliation pass in seconds.
pub const DEFAULT_RECONCILE_FIRST_DELAY_SECS: u64 = 30;

/// Default inbox directory scanned for extracted bags.
pub const DEFAULT_INBOX_DIR: &str = "./inbox";

/// Default inbox scan interval in seconds.
pub const DEFAULT_INBOX_SCAN_INTERVAL_SECS: u64 = 15;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub vault: VaultConfig,
    pub pid: PidConfig,
    pub indexer: IndexerConfig,
    pub workflow: WorkflowConfig,
    pub ingest: IngestConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Tiered archive storage service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub base_url: String,
    /// Storage transaction timeout passed when opening a transaction
    pub tx_timeout_secs: u64,
    /// Whether the cold (tape) tier is administratively enabled
    pub tape_enabled: bool,
    /// Media types routed exclusively to the offline tier when tape is enabled
    pub offline_media_types: Vec<String>,
}

/// Persistent identifier service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidConfig {
    pub base_url: String,
    /// Handle prefix under which identifiers are minted
    pub prefix: String,
}

/// External indexer notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    pub url: String,
    /// `context` field of the notification document
    pub context: String,
    /// `product` field of the notification document
    pub product: String,
    /// Cap on the post-commit descriptor visibility poll
    pub visibility_poll_cap_secs: u64,
}

/// External workflow processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub base_url: String,
    pub reconcile_interval_secs: u64,
    pub reconcile_first_delay_secs: u64,
    /// Import endpoint and credentials the processor uses to push a
    /// finished result back into this system
    pub result_url: String,
    pub result_username: String,
    pub result_password: String,
}

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Directory scanned for extracted bags awaiting ingestion
    pub inbox_dir: String,
    pub inbox_scan_interval_secs: u64,
    /// Bounded retry policy for transient remote failures
    pub retry_max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Path to the descriptor schema resource; missing at use time is a
    /// fatal configuration error
    pub descriptor_schema_path: String,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                connect_timeout_secs: env_parse(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
            vault: VaultConfig {
                base_url: std::env::var("VAULT_URL").unwrap_or_else(|_| DEFAULT_VAULT_URL.to_string()),
                tx_timeout_secs: env_parse("VAULT_TX_TIMEOUT", DEFAULT_VAULT_TX_TIMEOUT_SECS),
                tape_enabled: env_parse("VAULT_TAPE_ENABLED", true),
                offline_media_types: std::env::var("VAULT_OFFLINE_MEDIA_TYPES")
                    .unwrap_or_else(|_| DEFAULT_OFFLINE_MEDIA_TYPES.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            pid: PidConfig {
                base_url: std::env::var("PID_SERVICE_URL")
                    .unwrap_or_else(|_| DEFAULT_PID_SERVICE_URL.to_string()),
                prefix: std::env::var("PID_PREFIX").unwrap_or_else(|_| "21.11998".to_string()),
            },
            indexer: IndexerConfig {
                url: std::env::var("INDEXER_URL").unwrap_or_else(|_| DEFAULT_INDEXER_URL.to_string()),
                context: std::env::var("INDEXER_CONTEXT").unwrap_or_else(|_| "ocrd".to_string()),
                product: std::env::var("INDEXER_PRODUCT")
                    .unwrap_or_else(|_| "bagvault".to_string()),
                visibility_poll_cap_secs: env_parse(
                    "INDEXER_VISIBILITY_POLL_CAP",
                    DEFAULT_VISIBILITY_POLL_CAP_SECS,
                ),
            },
            workflow: WorkflowConfig {
                base_url: std::env::var("WORKFLOW_URL")
                    .unwrap_or_else(|_| DEFAULT_WORKFLOW_URL.to_string()),
                reconcile_interval_secs: env_parse(
                    "WORKFLOW_RECONCILE_INTERVAL",
                    DEFAULT_RECONCILE_INTERVAL_SECS,
                ),
                reconcile_first_delay_secs: env_parse(
                    "WORKFLOW_RECONCILE_FIRST_DELAY",
                    DEFAULT_RECONCILE_FIRST_DELAY_SECS,
                ),
                result_url: std::env::var("WORKFLOW_RESULT_URL")
                    .unwrap_or_else(|_| DEFAULT_WORKFLOW_RESULT_URL.to_string()),
                result_username: std::env::var("WORKFLOW_RESULT_USERNAME")
                    .unwrap_or_else(|_| "bagvault".to_string()),
                result_password: std::env::var("WORKFLOW_RESULT_PASSWORD").unwrap_or_default(),
            },
            ingest: IngestConfig {
                inbox_dir: std::env::var("INGEST_INBOX_DIR")
                    .unwrap_or_else(|_| DEFAULT_INBOX_DIR.to_string()),
                inbox_scan_interval_secs: env_parse(
                    "INGEST_INBOX_SCAN_INTERVAL",
                    DEFAULT_INBOX_SCAN_INTERVAL_SECS,
                ),
                retry_max_attempts: env_parse("INGEST_RETRY_MAX_ATTEMPTS", DEFAULT_RETRY_MAX_ATTEMPTS),
                retry_delay_ms: env_parse("INGEST_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS),
                descriptor_schema_path: std::env::var("INGEST_DESCRIPTOR_SCHEMA")
                    .unwrap_or_else(|_| "./resources/mets-schema.txt".to_string()),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.ingest.retry_max_attempts == 0 {
            anyhow::bail!("Retry max attempts must be greater than 0");
        }

        for url in [
            &self.vault.base_url,
            &self.pid.base_url,
            &self.indexer.url,
            &self.workflow.base_url,
        ] {
            if url.is_empty() {
                anyhow::bail!("Remote service URLs cannot be empty");
            }
        }

        if self.vault.tape_enabled && self.vault.offline_media_types.is_empty() {
            tracing::warn!("Tape tier enabled but no offline media types configured");
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            vault: VaultConfig {
                base_url: DEFAULT_VAULT_URL.to_string(),
                tx_timeout_secs: DEFAULT_VAULT_TX_TIMEOUT_SECS,
                tape_enabled: true,
                offline_media_types: DEFAULT_OFFLINE_MEDIA_TYPES
                    .split(',')
                    .map(|s| s.to_string())
                    .collect(),
            },
            pid: PidConfig {
                base_url: DEFAULT_PID_SERVICE_URL.to_string(),
                prefix: "21.11998".to_string(),
            },
            indexer: IndexerConfig {
                url: DEFAULT_INDEXER_URL.to_string(),
                context: "ocrd".to_string(),
                product: "bagvault".to_string(),
                visibility_poll_cap_secs: DEFAULT_VISIBILITY_POLL_CAP_SECS,
            },
            workflow: WorkflowConfig {
                base_url: DEFAULT_WORKFLOW_URL.to_string(),
                reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
                reconcile_first_delay_secs: DEFAULT_RECONCILE_FIRST_DELAY_SECS,
                result_url: DEFAULT_WORKFLOW_RESULT_URL.to_string(),
                result_username: "bagvault".to_string(),
                result_password: String::new(),
            },
            ingest: IngestConfig {
                inbox_dir: DEFAULT_INBOX_DIR.to_string(),
                inbox_scan_interval_secs: DEFAULT_INBOX_SCAN_INTERVAL_SECS,
                retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
                retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
                descriptor_schema_path: "./resources/mets-schema.txt".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut config = Config::default();
        config.ingest.retry_max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_vault_url_rejected() {
        let mut config = Config::default();
        config.vault.base_url = String::new();
        assert!(config.validate().is_err());
    }
}
