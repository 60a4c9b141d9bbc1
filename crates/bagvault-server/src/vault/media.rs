//! Media type detection for uploads
//!
//! The storage service wants a media type per uploaded file, and tier
//! routing keys off it (master images live on tape). Detection is by
//! extension; anything unknown is an octet stream.

use std::path::Path;

/// Detect the media type of a file from its extension.
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("tif") | Some("tiff") => "image/tiff",
        Some("jp2") => "image/jp2",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("pdf") => "application/pdf",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain",
        Some("json") => "application/json",
        Some("gz") | Some("tgz") => "application/gzip",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_known_extensions() {
        assert_eq!(media_type_for(&PathBuf::from("data/IMG/0001.TIF")), "image/tiff");
        assert_eq!(media_type_for(&PathBuf::from("mets.xml")), "application/xml");
        assert_eq!(media_type_for(&PathBuf::from("page.jp2")), "image/jp2");
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        assert_eq!(media_type_for(&PathBuf::from("bagit.weird")), "application/octet-stream");
        assert_eq!(media_type_for(&PathBuf::from("no_extension")), "application/octet-stream");
    }
}
