//! Shared domain types

use serde::{Deserialize, Serialize};

/// Checksum algorithm used by bag manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    /// Manifest filename suffix for this algorithm (e.g. "sha512" in
    /// `manifest-sha512.txt`)
    pub fn manifest_suffix(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
        }
    }
}

impl std::str::FromStr for ChecksumAlgorithm {
    type Err = crate::BagvaultError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(ChecksumAlgorithm::Sha256),
            "sha512" | "sha-512" => Ok(ChecksumAlgorithm::Sha512),
            other => Err(crate::BagvaultError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.manifest_suffix())
    }
}

/// Named storage class exposed by the archive backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProfile {
    /// Hot, disk-resident storage
    Online,
    /// Cold, tape-backed storage
    Offline,
    /// Disk staging area for data recalled from tape
    Mirror,
}

impl StorageProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageProfile::Online => "online",
            StorageProfile::Offline => "offline",
            StorageProfile::Mirror => "mirror",
        }
    }
}

impl std::fmt::Display for StorageProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
