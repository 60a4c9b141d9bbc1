//! Bag-level structural validation
//!
//! Checks the metadata rules a bag must satisfy before it is worth any
//! remote work. All violations are accumulated and reported together; the
//! validator never short-circuits on the first failure.

use tracing::instrument;

use crate::bag::{
    Bag, FULLTEXT_TYPES, KEY_FULLTEXT_FILEGRP, KEY_FULLTEXT_TYPE, KEY_GROUND_TRUTH,
    KEY_IDENTIFIER, KEY_IMAGE_FILEGRP,
};
use crate::error::{IngestError, IngestResult};

/// Verifies package-level metadata rules
pub struct StructureValidator;

impl StructureValidator {
    /// Validate a bag's structure and metadata.
    ///
    /// Fails with `PackageInvalid` carrying every violation found.
    #[instrument(skip(bag), fields(root = %bag.root().display()))]
    pub fn validate(bag: &Bag) -> IngestResult<()> {
        let mut errors = Vec::new();

        if bag.meta(KEY_IDENTIFIER).map_or(true, str::is_empty) {
            errors.push(format!("required key {KEY_IDENTIFIER} is missing"));
        }

        let descriptor = bag.descriptor_path();
        if !descriptor.is_file() {
            errors.push(format!(
                "primary descriptor file not found at {}",
                bag.descriptor_relative_path()
            ));
        }

        Self::check_file_groups(bag, KEY_IMAGE_FILEGRP, &mut errors);
        Self::check_file_groups(bag, KEY_FULLTEXT_FILEGRP, &mut errors);

        if let Some(fulltext_type) = bag.meta(KEY_FULLTEXT_TYPE) {
            if !FULLTEXT_TYPES.contains(&fulltext_type) {
                errors.push(format!(
                    "{KEY_FULLTEXT_TYPE} must be one of {FULLTEXT_TYPES:?}, got {fulltext_type}"
                ));
            }
        }

        if let Some(flag) = bag.meta(KEY_GROUND_TRUTH) {
            if flag.parse::<bool>().is_err() {
                errors.push(format!("{KEY_GROUND_TRUTH} must be a boolean, got {flag}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(IngestError::PackageInvalid(errors))
        }
    }

    /// Every declared file group identifier must correspond to a directory
    /// under the payload root. Declarations may be comma-separated and may
    /// repeat the key.
    fn check_file_groups(bag: &Bag, key: &str, errors: &mut Vec<String>) {
        for value in bag.meta_all(key) {
            for group in value.split(',').map(str::trim).filter(|g| !g.is_empty()) {
                if !bag.root().join("data").join(group).is_dir() {
                    errors.push(format!(
                        "{key} declares file group {group} but data/{group} does not exist"
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::tests::write_test_bag;
    use crate::bag::KEY_DESCRIPTOR_PATH;
    use std::fs;

    #[test]
    fn test_minimal_valid_bag() {
        let dir = write_test_bag(&[("mets.xml", b"<mets/>")], &[(KEY_IDENTIFIER, "work-1")]);
        let bag = Bag::open(dir.path()).unwrap();
        StructureValidator::validate(&bag).unwrap();
    }

    #[test]
    fn test_all_violations_accumulate() {
        // No identifier, no descriptor, bogus fulltext type, bogus GT flag,
        // dangling file group: five violations in one report.
        let dir = write_test_bag(
            &[("other.xml", b"<x/>")],
            &[
                (KEY_FULLTEXT_TYPE, "HOCR"),
                (KEY_GROUND_TRUTH, "maybe"),
                (KEY_IMAGE_FILEGRP, "IMG-MISSING"),
            ],
        );
        let bag = Bag::open(dir.path()).unwrap();

        let err = StructureValidator::validate(&bag).unwrap_err();
        match err {
            IngestError::PackageInvalid(errors) => assert_eq!(errors.len(), 5),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_alternate_descriptor_path() {
        let dir = write_test_bag(
            &[("custom/descriptor.xml", b"<mets/>")],
            &[
                (KEY_IDENTIFIER, "work-1"),
                (KEY_DESCRIPTOR_PATH, "data/custom/descriptor.xml"),
            ],
        );
        let bag = Bag::open(dir.path()).unwrap();
        StructureValidator::validate(&bag).unwrap();
    }

    #[test]
    fn test_declared_alternate_descriptor_must_exist() {
        let dir = write_test_bag(
            &[("mets.xml", b"<mets/>")],
            &[
                (KEY_IDENTIFIER, "work-1"),
                (KEY_DESCRIPTOR_PATH, "data/nowhere.xml"),
            ],
        );
        let bag = Bag::open(dir.path()).unwrap();

        let err = StructureValidator::validate(&bag).unwrap_err();
        assert!(matches!(err, IngestError::PackageInvalid(_)));
    }

    #[test]
    fn test_file_groups_resolve_to_directories() {
        let dir = write_test_bag(
            &[("mets.xml", b"<mets/>"), ("IMG/0001.tif", b"px"), ("ALTO/0001.xml", b"<a/>")],
            &[
                (KEY_IDENTIFIER, "work-1"),
                (KEY_IMAGE_FILEGRP, "IMG"),
                (KEY_FULLTEXT_FILEGRP, "ALTO"),
                (KEY_FULLTEXT_TYPE, "ALTO"),
                (KEY_GROUND_TRUTH, "true"),
            ],
        );
        let bag = Bag::open(dir.path()).unwrap();
        StructureValidator::validate(&bag).unwrap();
    }

    #[test]
    fn test_comma_separated_file_groups() {
        let dir = write_test_bag(
            &[("mets.xml", b"<mets/>"), ("IMG-A/1.tif", b"a")],
            &[(KEY_IDENTIFIER, "work-1"), (KEY_IMAGE_FILEGRP, "IMG-A, IMG-B")],
        );
        let bag = Bag::open(dir.path()).unwrap();

        let err = StructureValidator::validate(&bag).unwrap_err();
        match err {
            IngestError::PackageInvalid(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("IMG-B"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_conventional_descriptor_can_be_removed() {
        let dir = write_test_bag(&[("mets.xml", b"<mets/>")], &[(KEY_IDENTIFIER, "work-1")]);
        fs::remove_file(dir.path().join("data/mets.xml")).unwrap();

        let bag = Bag::open(dir.path()).unwrap();
        let err = StructureValidator::validate(&bag).unwrap_err();
        match err {
            IngestError::PackageInvalid(errors) => {
                assert!(errors.iter().any(|e| e.contains("descriptor")));
            },
            other => panic!("unexpected error: {other}"),
        }
    }
}
