//! Bagvault server library
//!
//! Long-term archive service for bag-structured digitized-work packages.
//!
//! # Overview
//!
//! The service core covers the whole ingestion lifecycle:
//!
//! - **Validation**: checksum, structural and descriptor-schema checks on an
//!   extracted bag before any remote side effect
//! - **Tiered storage**: transactional upload into hot ("online"), cold
//!   ("offline"/tape) and staging ("mirror") storage profiles
//! - **Identity**: persistent-identifier assignment and metadata propagation
//! - **Version chain**: previous/next linkage of successive uploads of the
//!   same logical work, safe under concurrent imports
//! - **External workflow**: dispatch of archived works to a remote processor
//!   and a reconciliation loop that finalizes outcomes
//!
//! # Architecture
//!
//! Collaborators are wired explicitly by constructor; background work runs
//! as plain `tokio` tasks ([`ingest::InboxScanner`],
//! [`workflow::ReconciliationLoop`]). The ingestion orchestrator owns
//! atomicity across the remote systems: validation happens before any
//! remote call, the storage transaction is always driven to commit or
//! rollback, and failures after identifier assignment unwind both the
//! identifier and every created storage object.
//!
//! Persistence is behind the [`store::ArchiveStore`] and
//! [`store::JobStore`] traits, with Postgres and in-memory implementations.

pub mod bag;
pub mod config;
pub mod error;
pub mod index;
pub mod ingest;
pub mod pid;
pub mod retry;
pub mod store;
pub mod validation;
pub mod vault;
pub mod workflow;

pub use config::Config;
pub use error::{IngestError, IngestResult};
