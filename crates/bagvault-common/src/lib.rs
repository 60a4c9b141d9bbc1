//! BagVault Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the BagVault project.
//!
//! # Overview
//!
//! This crate provides common functionality used across all BagVault
//! workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Checksums**: Streaming hash computation for bag manifests
//! - **Logging**: Centralized tracing initialization
//! - **Types**: Shared domain types (checksum algorithms, storage profiles)
//!
//! # Example
//!
//! ```no_run
//! use bagvault_common::{Result, BagvaultError};
//! use bagvault_common::checksum::compute_file_checksum;
//! use bagvault_common::types::ChecksumAlgorithm;
//!
//! fn fingerprint(path: &str) -> Result<String> {
//!     let digest = compute_file_checksum(path, ChecksumAlgorithm::Sha256)?;
//!     Ok(digest)
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{BagvaultError, Result};
