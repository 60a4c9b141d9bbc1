//! Bag reading
//!
//! A bag is an extracted content-addressed package: a `bag-info.txt` metadata
//! file, a `manifest-<alg>.txt` listing payload file hashes, a
//! `tagmanifest-<alg>.txt` listing tag file hashes, and the payload itself
//! under `data/`.
//!
//! This module only reads the structure; verification lives in
//! [`crate::validation`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use bagvault_common::checksum::compute_file_checksum;
use bagvault_common::types::ChecksumAlgorithm;

use crate::error::{IngestError, IngestResult};

// ============================================================================
// Well-known bag-info keys
// ============================================================================

/// Canonical identifier of the logical work; required.
pub const KEY_IDENTIFIER: &str = "Ocrd-Identifier";

/// Alternate path of the primary descriptor file, relative to the bag root.
pub const KEY_DESCRIPTOR_PATH: &str = "Ocrd-Mets";

/// Comma-separated file group identifiers holding page images.
pub const KEY_IMAGE_FILEGRP: &str = "Ocrd-Image-Filegrp";

/// Comma-separated file group identifiers holding fulltext.
pub const KEY_FULLTEXT_FILEGRP: &str = "Ocrd-Fulltext-Filegrp";

/// Declared fulltext format; must be one of [`FULLTEXT_TYPES`].
pub const KEY_FULLTEXT_TYPE: &str = "Ocrd-Fulltext-Type";

/// Declared ground-truth flag; must parse as a boolean.
pub const KEY_GROUND_TRUTH: &str = "Ocrd-GT";

/// Persistent identifier of the previous version of the same work.
pub const KEY_PREVIOUS_VERSION: &str = "Ocrd-Previous-Version";

/// Conventional location of the primary descriptor file.
pub const DEFAULT_DESCRIPTOR_PATH: &str = "data/mets.xml";

/// Accepted fulltext format identifiers.
pub const FULLTEXT_TYPES: &[&str] = &["ALTO", "PAGE", "TEI", "TXT"];

/// One `(hash, relative path)` line of a manifest file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub hash: String,
    pub path: String,
}

/// An extracted bag on local disk
#[derive(Debug, Clone)]
pub struct Bag {
    root: PathBuf,
    algorithm: ChecksumAlgorithm,
    /// bag-info.txt key/value pairs; duplicate keys accumulate in order
    metadata: HashMap<String, Vec<String>>,
}

impl Bag {
    /// Open an extracted bag, detecting the manifest algorithm from the
    /// manifest filename and parsing `bag-info.txt`.
    pub fn open(root: impl Into<PathBuf>) -> IngestResult<Self> {
        let root = root.into();
        let algorithm = detect_algorithm(&root)?;
        let metadata = parse_bag_info(&root.join("bag-info.txt"))?;

        Ok(Self { root, algorithm, metadata })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// First value for a bag-info key
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    /// All values for a bag-info key
    pub fn meta_all(&self, key: &str) -> &[String] {
        self.metadata.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Flattened metadata pairs, propagated to the identifier record
    pub fn metadata_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .metadata
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.clone(), v.clone())))
            .collect();
        pairs.sort();
        pairs
    }

    /// Path of the primary descriptor file, honoring a declared alternate
    /// location.
    pub fn descriptor_path(&self) -> PathBuf {
        match self.meta(KEY_DESCRIPTOR_PATH) {
            Some(alt) => self.root.join(alt),
            None => self.root.join(DEFAULT_DESCRIPTOR_PATH),
        }
    }

    /// Descriptor location relative to the bag root, as stored remotely
    pub fn descriptor_relative_path(&self) -> String {
        self.meta(KEY_DESCRIPTOR_PATH)
            .unwrap_or(DEFAULT_DESCRIPTOR_PATH)
            .to_string()
    }

    /// Absolute path of the payload manifest file
    pub fn payload_manifest_path(&self) -> PathBuf {
        self.root
            .join(format!("manifest-{}.txt", self.algorithm.manifest_suffix()))
    }

    /// Absolute path of the tag manifest file
    pub fn tag_manifest_path(&self) -> PathBuf {
        self.root
            .join(format!("tagmanifest-{}.txt", self.algorithm.manifest_suffix()))
    }

    /// Parse the payload manifest
    pub fn payload_manifest(&self) -> IngestResult<Vec<ManifestEntry>> {
        parse_manifest(&self.payload_manifest_path())
    }

    /// Parse the tag manifest
    pub fn tag_manifest(&self) -> IngestResult<Vec<ManifestEntry>> {
        parse_manifest(&self.tag_manifest_path())
    }

    /// Content fingerprint of the payload: the hash of the payload manifest
    /// file itself. Two bags with identical payload manifests carry identical
    /// payloads, so this is what duplicate detection compares.
    pub fn payload_fingerprint(&self) -> IngestResult<String> {
        let path = self.payload_manifest_path();
        if !path.is_file() {
            return Err(IngestError::ManifestMissing(path.display().to_string()));
        }
        Ok(compute_file_checksum(&path, ChecksumAlgorithm::Sha256)?)
    }
}

/// Detect the manifest algorithm from the files present at the bag root.
/// Prefers sha512 when both are present, matching common bagging tools.
fn detect_algorithm(root: &Path) -> IngestResult<ChecksumAlgorithm> {
    for alg in [ChecksumAlgorithm::Sha512, ChecksumAlgorithm::Sha256] {
        if root.join(format!("manifest-{}.txt", alg.manifest_suffix())).is_file() {
            return Ok(alg);
        }
    }
    Err(IngestError::ManifestMissing(format!(
        "{}/manifest-<alg>.txt",
        root.display()
    )))
}

/// Parse a manifest file into `(hash, path)` entries.
///
/// Each line is `<hash><whitespace><relative path>`; blank lines are skipped.
pub fn parse_manifest(path: &Path) -> IngestResult<Vec<ManifestEntry>> {
    if !path.is_file() {
        return Err(IngestError::ManifestMissing(path.display().to_string()));
    }

    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (hash, rel) = line.split_once(char::is_whitespace).ok_or_else(|| {
            IngestError::PackageInvalid(vec![format!(
                "malformed manifest line in {}: {line}",
                path.display()
            )])
        })?;
        entries.push(ManifestEntry {
            hash: hash.to_string(),
            path: rel.trim().to_string(),
        });
    }

    Ok(entries)
}

/// Parse `bag-info.txt` key/value metadata.
///
/// Lines are `Key: value`; a line starting with whitespace continues the
/// previous value; duplicate keys accumulate.
fn parse_bag_info(path: &Path) -> IngestResult<HashMap<String, Vec<String>>> {
    let mut metadata: HashMap<String, Vec<String>> = HashMap::new();
    if !path.is_file() {
        return Ok(metadata);
    }

    let content = fs::read_to_string(path)?;
    let mut last_key: Option<String> = None;

    for line in content.lines() {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            if let Some(key) = &last_key {
                if let Some(values) = metadata.get_mut(key) {
                    if let Some(last) = values.last_mut() {
                        last.push(' ');
                        last.push_str(line.trim());
                    }
                }
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_string();
            metadata
                .entry(key.clone())
                .or_default()
                .push(value.trim().to_string());
            last_key = Some(key);
        }
    }

    Ok(metadata)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Build a minimal valid bag on disk for tests across the crate.
    pub(crate) fn write_test_bag(files: &[(&str, &[u8])], info: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        let mut payload_lines = Vec::new();
        for (rel, content) in files {
            let path = root.join("data").join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            let hash = compute_file_checksum(&path, ChecksumAlgorithm::Sha512).unwrap();
            payload_lines.push(format!("{hash} data/{rel}"));
        }
        fs::write(root.join("manifest-sha512.txt"), payload_lines.join("\n")).unwrap();

        let mut info_file = fs::File::create(root.join("bag-info.txt")).unwrap();
        for (k, v) in info {
            writeln!(info_file, "{k}: {v}").unwrap();
        }
        drop(info_file);

        let mut tag_lines = Vec::new();
        for tag in ["bag-info.txt", "manifest-sha512.txt"] {
            let hash = compute_file_checksum(root.join(tag), ChecksumAlgorithm::Sha512).unwrap();
            tag_lines.push(format!("{hash} {tag}"));
        }
        fs::write(root.join("tagmanifest-sha512.txt"), tag_lines.join("\n")).unwrap();

        dir
    }

    #[test]
    fn test_open_detects_algorithm_and_metadata() {
        let dir = write_test_bag(
            &[("mets.xml", b"<mets/>")],
            &[(KEY_IDENTIFIER, "work-1"), ("Bagging-Date", "2026-08-01")],
        );

        let bag = Bag::open(dir.path()).unwrap();
        assert_eq!(bag.algorithm(), ChecksumAlgorithm::Sha512);
        assert_eq!(bag.meta(KEY_IDENTIFIER), Some("work-1"));
        assert_eq!(bag.descriptor_relative_path(), DEFAULT_DESCRIPTOR_PATH);
    }

    #[test]
    fn test_open_without_manifest_fails() {
        let dir = TempDir::new().unwrap();
        let err = Bag::open(dir.path()).unwrap_err();
        assert!(matches!(err, IngestError::ManifestMissing(_)));
    }

    #[test]
    fn test_parse_manifest_entries() {
        let dir = write_test_bag(&[("a.xml", b"a"), ("sub/b.xml", b"b")], &[]);
        let bag = Bag::open(dir.path()).unwrap();

        let entries = bag.payload_manifest().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.path == "data/a.xml"));
        assert!(entries.iter().any(|e| e.path == "data/sub/b.xml"));
    }

    #[test]
    fn test_duplicate_keys_accumulate() {
        let dir = write_test_bag(
            &[("mets.xml", b"<mets/>")],
            &[(KEY_IMAGE_FILEGRP, "IMG-A"), (KEY_IMAGE_FILEGRP, "IMG-B")],
        );
        let bag = Bag::open(dir.path()).unwrap();
        assert_eq!(bag.meta_all(KEY_IMAGE_FILEGRP), &["IMG-A", "IMG-B"]);
    }

    #[test]
    fn test_payload_fingerprint_tracks_manifest() {
        let dir1 = write_test_bag(&[("mets.xml", b"same")], &[]);
        let dir2 = write_test_bag(&[("mets.xml", b"same")], &[]);
        let dir3 = write_test_bag(&[("mets.xml", b"different")], &[]);

        let f1 = Bag::open(dir1.path()).unwrap().payload_fingerprint().unwrap();
        let f2 = Bag::open(dir2.path()).unwrap().payload_fingerprint().unwrap();
        let f3 = Bag::open(dir3.path()).unwrap().payload_fingerprint().unwrap();

        assert_eq!(f1, f2);
        assert_ne!(f1, f3);
    }
}
