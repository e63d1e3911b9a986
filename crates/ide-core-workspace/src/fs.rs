//! Read-only filesystem queries confined to the workspace root.
//!
//! Both walks honor `.gitignore` / `.ignore` files and skip hidden entries.

use crate::error::WorkspaceError;
use crate::paths::WorkspaceRoot;
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use serde::Serialize;
use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Result cap for [`search_files`].
pub const MAX_SEARCH_RESULTS: usize = 500;

/// A file found by [`search_files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Path relative to the root.
    pub path: String,
    /// `file://` URI.
    pub uri: String,
}

/// Files matching a glob, most recently modified first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSearch {
    /// Matches.
    pub files: Vec<FileEntry>,
    /// More files matched than were returned.
    pub truncated: bool,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedEntry {
    /// Path relative to the root.
    pub path: String,
    /// Directory flag.
    pub is_dir: bool,
    /// Depth below the listed directory (1 = direct child).
    pub depth: usize,
}

/// A directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryListing {
    /// Listed directory, relative to the root.
    pub path: String,
    /// Entries in walk order (directories before their contents, siblings by name).
    pub entries: Vec<ListedEntry>,
}

impl DirectoryListing {
    /// Indented tree, one `- name` line per entry; directories end with `/`.
    pub fn render(&self) -> String {
        let mut out = format!("{}/", self.path);
        for entry in &self.entries {
            let name = entry.path.rsplit('/').next().unwrap_or(&entry.path);
            out.push('\n');
            out.push_str(&"  ".repeat(entry.depth.saturating_sub(1)));
            out.push_str("- ");
            out.push_str(name);
            if entry.is_dir {
                out.push('/');
            }
        }
        out
    }
}

fn walker(dir: &Path) -> WalkBuilder {
    let mut builder = WalkBuilder::new(dir);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_exclude(true)
        .ignore(true)
        .parents(true)
        .require_git(false);
    builder
}

/// Files below `dir`, in name order.
pub(crate) fn walk_files(dir: &Path) -> impl Iterator<Item = PathBuf> {
    walker(dir)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_some_and(|ft| ft.is_file()) => {
                Some(entry.into_path())
            }
            Ok(_) => None,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                None
            }
        })
}

fn directory(root: &WorkspaceRoot, path: Option<&str>) -> Result<PathBuf, WorkspaceError> {
    let dir = root.resolve(path.unwrap_or("."))?.path;
    if !dir.is_dir() {
        return Err(WorkspaceError::Validation(format!(
            "`{}` is not a directory",
            root.relative(&dir)
        )));
    }
    Ok(dir)
}

/// Files under `path` (default: the root) matching the gitignore-style glob `pattern`.
pub fn search_files(
    root: &WorkspaceRoot,
    pattern: &str,
    path: Option<&str>,
) -> Result<FileSearch, WorkspaceError> {
    if pattern.trim().is_empty() {
        return Err(WorkspaceError::Validation("pattern must not be empty".to_string()));
    }
    let dir = directory(root, path)?;

    let mut overrides = OverrideBuilder::new(&dir);
    overrides
        .add(pattern)
        .map_err(|err| WorkspaceError::Validation(format!("invalid glob `{pattern}`: {err}")))?;
    let overrides = overrides
        .build()
        .map_err(|err| WorkspaceError::Validation(format!("invalid glob `{pattern}`: {err}")))?;

    let mut found: Vec<(SystemTime, String, String)> = Vec::new();
    for entry in walker(&dir).overrides(overrides).build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let resolved = match root.resolve(&root.relative(entry.path())) {
            Ok(resolved) => resolved,
            Err(_) => continue,
        };
        let modified = entry
            .metadata()
            .ok()
            .and_then(|meta| meta.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((modified, root.relative(&resolved.path), resolved.uri));
    }

    found.sort_by(|a, b| (Reverse(a.0), &a.1).cmp(&(Reverse(b.0), &b.1)));
    let truncated = found.len() > MAX_SEARCH_RESULTS;
    let files = found
        .into_iter()
        .take(MAX_SEARCH_RESULTS)
        .map(|(_, path, uri)| FileEntry { path, uri })
        .collect();
    Ok(FileSearch { files, truncated })
}

/// Tree below `path` (default: the root), `depth` levels deep (default 2).
pub fn list_directory(
    root: &WorkspaceRoot,
    path: Option<&str>,
    depth: Option<usize>,
) -> Result<DirectoryListing, WorkspaceError> {
    let dir = directory(root, path)?;
    let depth = depth.unwrap_or(2).max(1);

    let mut entries = Vec::new();
    let walk = walker(&dir)
        .max_depth(Some(depth))
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();
    for entry in walk.flatten() {
        if entry.depth() == 0 {
            continue;
        }
        entries.push(ListedEntry {
            path: root.relative(entry.path()),
            is_dir: entry.file_type().is_some_and(|ft| ft.is_dir()),
            depth: entry.depth(),
        });
    }

    Ok(DirectoryListing {
        path: root.relative(&dir),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::time::Duration;

    fn tree() -> (tempfile::TempDir, WorkspaceRoot) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/pkg")).unwrap();
        fs::create_dir_all(dir.path().join("build")).unwrap();
        fs::write(dir.path().join(".gitignore"), "build/\n").unwrap();
        fs::write(dir.path().join("src/a.py"), "a").unwrap();
        fs::write(dir.path().join("src/pkg/b.py"), "b").unwrap();
        fs::write(dir.path().join("src/notes.txt"), "n").unwrap();
        fs::write(dir.path().join("build/gen.py"), "g").unwrap();
        let root = WorkspaceRoot::new(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn search_honors_gitignore_and_orders_by_recency() {
        let (dir, root) = tree();
        let later = SystemTime::now() + Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(dir.path().join("src/a.py"))
            .unwrap()
            .set_modified(later)
            .unwrap();

        let found = search_files(&root, "*.py", None).unwrap();
        let paths: Vec<_> = found.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.py", "src/pkg/b.py"]);
        assert!(!found.truncated);
        assert!(found.files[0].uri.starts_with("file://"));
    }

    #[test]
    fn search_is_scoped_to_a_subdirectory() {
        let (_dir, root) = tree();
        let found = search_files(&root, "*.py", Some("src/pkg")).unwrap();
        assert_eq!(found.files.len(), 1);
        assert!(matches!(
            search_files(&root, "*.py", Some("../")),
            Err(WorkspaceError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn file_walk_skips_ignored_entries() {
        let (dir, _root) = tree();
        let files: Vec<_> = walk_files(dir.path())
            .map(|path| path.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            files,
            vec![
                PathBuf::from("src/a.py"),
                PathBuf::from("src/notes.txt"),
                PathBuf::from("src/pkg/b.py"),
            ]
        );
    }

    #[test]
    fn listing_renders_a_tree() {
        let (_dir, root) = tree();
        let listing = list_directory(&root, None, Some(3)).unwrap();
        assert_eq!(
            listing.render(),
            "./\n- src/\n  - a.py\n  - notes.txt\n  - pkg/\n    - b.py"
        );

        let shallow = list_directory(&root, Some("src"), Some(1)).unwrap();
        assert_eq!(shallow.path, "src");
        assert_eq!(shallow.entries.len(), 3);
    }
}
