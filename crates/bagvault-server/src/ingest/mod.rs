//! Archive ingestion pipeline
//!
//! [`orchestrator::IngestionOrchestrator`] coordinates one ingestion
//! attempt end to end; [`chain::VersionChainManager`] owns the only
//! serialization point (the per-work lock); [`inbox::InboxScanner`] feeds
//! the orchestrator from a spool directory, one task per bag. Every
//! attempt leaves a terminal [`status::IngestStatus`] record behind.

pub mod chain;
pub mod inbox;
pub mod orchestrator;
pub mod status;

pub use chain::{KeyedLocks, VersionChainManager};
pub use inbox::InboxScanner;
pub use orchestrator::{IngestReceipt, IngestSettings, IngestState, IngestionOrchestrator, IngestionRequest};
pub use status::{IngestStatus, IngestTracker};
