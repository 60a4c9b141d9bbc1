//! Descriptor (METS) schema validation
//!
//! The primary descriptor file is checked against a fixed schema resource:
//! a plain-text file naming the expected root element followed by the
//! elements that must appear somewhere in the document. The schema resource
//! being unavailable is a fatal configuration error, not a validation
//! failure of the package.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::instrument;

use crate::error::{IngestError, IngestResult};

/// Validates the primary descriptor against a fixed schema resource
pub struct DescriptorValidator {
    schema_path: PathBuf,
}

impl DescriptorValidator {
    pub fn new(schema_path: impl Into<PathBuf>) -> Self {
        Self { schema_path: schema_path.into() }
    }

    /// Validate the descriptor file at `descriptor_path`.
    ///
    /// Fails with `Configuration` when the schema resource cannot be read,
    /// with `DescriptorInvalid` when the document is malformed or does not
    /// satisfy the schema.
    #[instrument(skip(self), fields(schema = %self.schema_path.display()))]
    pub fn validate(&self, descriptor_path: &Path) -> IngestResult<()> {
        let schema = self.load_schema()?;

        let content = fs::read_to_string(descriptor_path).map_err(|e| {
            IngestError::DescriptorInvalid(format!(
                "cannot read {}: {e}",
                descriptor_path.display()
            ))
        })?;

        let (root, elements) = parse_element_names(&content)?;

        if root != schema.root {
            return Err(IngestError::DescriptorInvalid(format!(
                "root element is {root}, expected {}",
                schema.root
            )));
        }

        for required in &schema.required {
            if !elements.contains(required) {
                return Err(IngestError::DescriptorInvalid(format!(
                    "required element {required} is missing"
                )));
            }
        }

        Ok(())
    }

    /// Load the schema resource. The first non-comment line names the root
    /// element, every following line a required element.
    fn load_schema(&self) -> IngestResult<Schema> {
        let content = fs::read_to_string(&self.schema_path).map_err(|e| {
            IngestError::Configuration(format!(
                "descriptor schema unavailable at {}: {e}",
                self.schema_path.display()
            ))
        })?;

        let mut lines = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));

        let root = lines
            .next()
            .ok_or_else(|| {
                IngestError::Configuration(format!(
                    "descriptor schema at {} is empty",
                    self.schema_path.display()
                ))
            })?
            .to_string();

        Ok(Schema {
            root,
            required: lines.map(str::to_string).collect(),
        })
    }
}

struct Schema {
    root: String,
    required: Vec<String>,
}

/// Parse the document, returning the root element's local name and the set
/// of all element local names. Malformed XML fails here.
fn parse_element_names(content: &str) -> IngestResult<(String, HashSet<String>)> {
    let mut reader = Reader::from_str(content);
    let mut root = None;
    let mut elements = HashSet::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if root.is_none() {
                    root = Some(name.clone());
                }
                elements.insert(name);
            },
            Ok(Event::Eof) => break,
            Ok(_) => {},
            Err(e) => {
                return Err(IngestError::DescriptorInvalid(format!("malformed XML: {e}")));
            },
        }
        buf.clear();
    }

    let root = root
        .ok_or_else(|| IngestError::DescriptorInvalid("document has no elements".to_string()))?;

    Ok((root, elements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SCHEMA: &str = "mets\nfileSec\nstructMap\n";

    const VALID_METS: &str = r#"<?xml version="1.0"?>
        <mets xmlns="http://www.loc.gov/METS/">
          <fileSec><fileGrp USE="IMG"/></fileSec>
          <structMap TYPE="PHYSICAL"/>
        </mets>"#;

    fn write_files(schema: Option<&str>, descriptor: &str) -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let schema_path = dir.path().join("schema.txt");
        if let Some(s) = schema {
            fs::write(&schema_path, s).unwrap();
        }
        let descriptor_path = dir.path().join("mets.xml");
        let mut f = fs::File::create(&descriptor_path).unwrap();
        f.write_all(descriptor.as_bytes()).unwrap();
        (dir, schema_path, descriptor_path)
    }

    #[test]
    fn test_valid_descriptor() {
        let (_dir, schema, descriptor) = write_files(Some(SCHEMA), VALID_METS);
        DescriptorValidator::new(schema).validate(&descriptor).unwrap();
    }

    #[test]
    fn test_missing_schema_is_configuration_error() {
        let (_dir, schema, descriptor) = write_files(None, VALID_METS);
        let err = DescriptorValidator::new(schema).validate(&descriptor).unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }

    #[test]
    fn test_wrong_root_element() {
        let (_dir, schema, descriptor) = write_files(Some(SCHEMA), "<notmets/>");
        let err = DescriptorValidator::new(schema).validate(&descriptor).unwrap_err();
        assert!(matches!(err, IngestError::DescriptorInvalid(_)));
    }

    #[test]
    fn test_missing_required_element() {
        let (_dir, schema, descriptor) =
            write_files(Some(SCHEMA), r#"<mets><fileSec/></mets>"#);
        let err = DescriptorValidator::new(schema).validate(&descriptor).unwrap_err();
        match err {
            IngestError::DescriptorInvalid(reason) => assert!(reason.contains("structMap")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_xml() {
        let (_dir, schema, descriptor) = write_files(Some(SCHEMA), "<mets><unclosed></mets>");
        let err = DescriptorValidator::new(schema).validate(&descriptor).unwrap_err();
        assert!(matches!(err, IngestError::DescriptorInvalid(_)));
    }
}
