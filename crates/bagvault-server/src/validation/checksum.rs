//! Manifest checksum verification
//!
//! Verifies the tag and payload manifests of an extracted bag against the
//! actual file content. Every referenced file is read exactly once with
//! streaming hashing; there is no separate tree walk, so verification scales
//! linearly with payload size even for bags with tens of thousands of files.

use tracing::{debug, instrument};

use bagvault_common::checksum::compute_file_checksum;

use crate::bag::{Bag, ManifestEntry};
use crate::error::{IngestError, IngestResult};

/// Verifies manifest hashes against on-disk content
pub struct ChecksumValidator;

impl ChecksumValidator {
    /// Verify both manifests of a bag.
    ///
    /// Returns `Ok(())` when every hash matches, `ChecksumMismatch` with the
    /// full list of offending paths otherwise, and `ManifestMissing` when a
    /// manifest file itself is absent.
    #[instrument(skip(bag), fields(root = %bag.root().display()))]
    pub fn validate(bag: &Bag) -> IngestResult<()> {
        let mut mismatches = Vec::new();

        mismatches.extend(Self::verify_entries(bag, &bag.tag_manifest()?)?);
        mismatches.extend(Self::verify_entries(bag, &bag.payload_manifest()?)?);

        if mismatches.is_empty() {
            debug!("all manifest hashes verified");
            Ok(())
        } else {
            Err(IngestError::ChecksumMismatch(mismatches))
        }
    }

    /// Hash every referenced file once and collect mismatched or missing
    /// paths. IO failures other than a missing file are propagated.
    fn verify_entries(bag: &Bag, entries: &[ManifestEntry]) -> IngestResult<Vec<String>> {
        let mut mismatches = Vec::new();

        for entry in entries {
            let path = bag.root().join(&entry.path);
            if !path.is_file() {
                mismatches.push(entry.path.clone());
                continue;
            }

            let actual = compute_file_checksum(&path, bag.algorithm())?;
            if !actual.eq_ignore_ascii_case(&entry.hash) {
                mismatches.push(entry.path.clone());
            }
        }

        Ok(mismatches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::tests::write_test_bag;
    use std::fs;

    #[test]
    fn test_valid_bag_has_no_mismatches() {
        let dir = write_test_bag(
            &[("mets.xml", b"<mets/>"), ("img/0001.tif", b"pixels")],
            &[("Ocrd-Identifier", "work-1")],
        );
        let bag = Bag::open(dir.path()).unwrap();

        ChecksumValidator::validate(&bag).unwrap();
    }

    #[test]
    fn test_corrupted_payload_is_reported() {
        let dir = write_test_bag(
            &[("mets.xml", b"<mets/>"), ("img/0001.tif", b"pixels")],
            &[],
        );
        fs::write(dir.path().join("data/img/0001.tif"), b"tampered").unwrap();

        let bag = Bag::open(dir.path()).unwrap();
        let err = ChecksumValidator::validate(&bag).unwrap_err();

        match err {
            IngestError::ChecksumMismatch(paths) => {
                assert_eq!(paths, vec!["data/img/0001.tif".to_string()]);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_payload_file_is_reported() {
        let dir = write_test_bag(&[("mets.xml", b"<mets/>"), ("gone.txt", b"x")], &[]);
        fs::remove_file(dir.path().join("data/gone.txt")).unwrap();

        let bag = Bag::open(dir.path()).unwrap();
        let err = ChecksumValidator::validate(&bag).unwrap_err();

        match err {
            IngestError::ChecksumMismatch(paths) => {
                assert!(paths.contains(&"data/gone.txt".to_string()));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_tag_manifest_fails_distinctly() {
        let dir = write_test_bag(&[("mets.xml", b"<mets/>")], &[]);
        fs::remove_file(dir.path().join("tagmanifest-sha512.txt")).unwrap();

        let bag = Bag::open(dir.path()).unwrap();
        let err = ChecksumValidator::validate(&bag).unwrap_err();
        assert!(matches!(err, IngestError::ManifestMissing(_)));
    }

    #[test]
    fn test_all_mismatches_collected() {
        let dir = write_test_bag(&[("a.txt", b"a"), ("b.txt", b"b")], &[]);
        fs::write(dir.path().join("data/a.txt"), b"x").unwrap();
        fs::write(dir.path().join("data/b.txt"), b"y").unwrap();

        let bag = Bag::open(dir.path()).unwrap();
        let err = ChecksumValidator::validate(&bag).unwrap_err();

        match err {
            IngestError::ChecksumMismatch(paths) => assert_eq!(paths.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
