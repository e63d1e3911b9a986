//! `file://` URI helpers.

use std::path::{Path, PathBuf};
use url::Url;

/// Convert an absolute filesystem path into a `file://` URI.
///
/// Returns `None` for relative paths.
pub fn path_to_file_uri(path: &Path) -> Option<String> {
    Url::from_file_path(path).ok().map(String::from)
}

/// Convert a `file://` URI back into a filesystem path.
///
/// Returns `None` for other schemes or malformed URIs.
pub fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    let url = Url::parse(uri).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}
