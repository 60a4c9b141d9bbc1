//! Metadata key mapping
//!
//! Maps the well-known bag metadata keys onto the storage service's
//! metadata fields. Matching is case-insensitive and accepts dotted or
//! hyphenated spellings interchangeably (`Ocrd.Identifier`,
//! `ocrd-identifier`). Keys outside the well-known set are dropped.

use std::collections::BTreeMap;

/// `(normalized source key, remote field)` pairs
const KEY_MAP: &[(&str, &str)] = &[
    ("ocrd-identifier", "dc:identifier"),
    ("ocrd-work-identifier", "dc:relation"),
    ("title", "dc:title"),
    ("creator", "dc:creator"),
    ("publisher", "dc:publisher"),
    ("bagging-date", "dc:date"),
    ("rights", "dc:rights"),
    ("source-organization", "dc:source"),
    ("external-description", "dc:description"),
    ("ocrd-gt", "meta:ground-truth"),
    ("ocrd-fulltext-type", "meta:fulltext-type"),
];

/// Map raw metadata pairs onto remote fields, dropping unrecognized keys.
/// Repeated values for the same field are joined with `; `.
pub fn map_metadata(pairs: &[(String, String)]) -> BTreeMap<String, String> {
    let mut mapped: BTreeMap<String, String> = BTreeMap::new();

    for (key, value) in pairs {
        let normalized = key.to_ascii_lowercase().replace(['.', '_'], "-");
        if let Some((_, field)) = KEY_MAP.iter().find(|(k, _)| *k == normalized) {
            mapped
                .entry(field.to_string())
                .and_modify(|existing| {
                    existing.push_str("; ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.clone());
        }
    }

    mapped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_spelling_variants_map_to_same_field() {
        let mapped = map_metadata(&pairs(&[("Ocrd.Identifier", "a")]));
        assert_eq!(mapped.get("dc:identifier").map(String::as_str), Some("a"));

        let mapped = map_metadata(&pairs(&[("OCRD-IDENTIFIER", "b")]));
        assert_eq!(mapped.get("dc:identifier").map(String::as_str), Some("b"));
    }

    #[test]
    fn test_unknown_keys_dropped() {
        let mapped = map_metadata(&pairs(&[("Payload-Oxum", "123.4"), ("Title", "Faust")]));
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped.get("dc:title").map(String::as_str), Some("Faust"));
    }

    #[test]
    fn test_repeated_values_joined() {
        let mapped = map_metadata(&pairs(&[("Creator", "Goethe"), ("creator", "Eckermann")]));
        assert_eq!(mapped.get("dc:creator").map(String::as_str), Some("Goethe; Eckermann"));
    }

    #[test]
    fn test_empty_input() {
        assert!(map_metadata(&[]).is_empty());
    }
}
