//! Resolution of request paths against the workspace root.
//!
//! Requests name files either as `file://` URIs or as paths relative to the root. Both resolve to
//! an absolute path that must stay inside the root, and to the canonical URI used as the document
//! key.

use crate::error::WorkspaceError;
use ide_core_lsp::{file_uri_to_path, path_to_file_uri};
use std::path::{Component, Path, PathBuf};

/// A path inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Absolute filesystem path.
    pub path: PathBuf,
    /// `file://` URI of `path`.
    pub uri: String,
}

impl ResolvedPath {
    /// Extension without the dot.
    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|ext| ext.to_str())
    }
}

/// The sandbox every request path is confined to.
#[derive(Debug, Clone)]
pub struct WorkspaceRoot {
    root: PathBuf,
}

impl WorkspaceRoot {
    /// Canonicalize `root`, which must be an existing directory.
    pub fn new(root: &Path) -> Result<Self, WorkspaceError> {
        let root = root
            .canonicalize()
            .map_err(|source| WorkspaceError::io(root, source))?;
        if !root.is_dir() {
            return Err(WorkspaceError::Validation(format!(
                "workspace root `{}` is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// Absolute root path.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a URI or root-relative path.
    pub fn resolve(&self, uri_or_path: &str) -> Result<ResolvedPath, WorkspaceError> {
        let trimmed = uri_or_path.trim();
        if trimmed.is_empty() {
            return Err(WorkspaceError::Validation("path must not be empty".to_string()));
        }

        let requested = if trimmed.starts_with("file://") {
            file_uri_to_path(trimmed).ok_or_else(|| {
                WorkspaceError::Validation(format!("`{trimmed}` is not a valid file URI"))
            })?
        } else if trimmed.contains("://") {
            return Err(WorkspaceError::Validation(format!(
                "unsupported URI scheme in `{trimmed}`"
            )));
        } else {
            self.root.join(trimmed)
        };

        let path = self.confine(&requested).ok_or_else(|| WorkspaceError::OutsideRoot {
            path: uri_or_path.to_string(),
        })?;
        let uri = path_to_file_uri(&path).ok_or_else(|| {
            WorkspaceError::Validation(format!("`{}` cannot be expressed as a URI", path.display()))
        })?;
        Ok(ResolvedPath { path, uri })
    }

    /// Path relative to the root, `/`-separated.
    pub fn relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let text = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if text.is_empty() { ".".to_string() } else { text }
    }

    fn confine(&self, requested: &Path) -> Option<PathBuf> {
        let normalized = normalize(requested);
        if !normalized.starts_with(&self.root) {
            return None;
        }
        // Symlinks may still lead outside; check the deepest existing ancestor.
        let mut existing = normalized.as_path();
        while !existing.exists() {
            existing = existing.parent()?;
        }
        let real = existing.canonicalize().ok()?;
        real.starts_with(&self.root).then_some(normalized)
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn relative_paths_and_uris_resolve_to_the_same_document() {
        let dir = tempfile::tempdir().unwrap();
        let root = WorkspaceRoot::new(dir.path()).unwrap();

        let by_path = root.resolve("src/a.py").unwrap();
        let by_uri = root.resolve(&by_path.uri).unwrap();
        assert_eq!(by_path, by_uri);
        assert_eq!(by_path.path, root.path().join("src/a.py"));
        assert_eq!(by_path.extension(), Some("py"));
        assert_eq!(root.relative(&by_path.path), "src/a.py");
    }

    #[test]
    fn escaping_the_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = WorkspaceRoot::new(dir.path()).unwrap();

        assert!(matches!(
            root.resolve("../outside.py"),
            Err(WorkspaceError::OutsideRoot { .. })
        ));
        assert!(matches!(
            root.resolve("file:///etc/passwd"),
            Err(WorkspaceError::OutsideRoot { .. })
        ));
        assert!(root.resolve("a/../b.py").is_ok());
        assert!(matches!(
            root.resolve("https://example.com/a.py"),
            Err(WorkspaceError::Validation(_))
        ));
    }

    #[test]
    fn symlink_out_of_the_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let root = WorkspaceRoot::new(dir.path()).unwrap();

        assert!(matches!(
            root.resolve("link/secret.py"),
            Err(WorkspaceError::OutsideRoot { .. })
        ));
    }
}
