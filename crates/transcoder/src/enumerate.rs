//! Path enumeration for discovering files under a start directory.
//!
//! Lists regular files directly under a root, or at every depth when
//! recursion is requested. Directories are tracked by canonical identity so a
//! symlink cycle (or two links to the same directory) is only listed once.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Error type for enumeration of the start directory.
#[derive(Debug, Error)]
pub enum EnumerateError {
    /// The root exists but is not a directory.
    #[error("Not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    /// The root could not be stat'd.
    #[error("Cannot read {}: {source}", path.display())]
    PathUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A regular file found by the enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileEntry {
    path: PathBuf,
}

impl FileEntry {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Absolute path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }

    /// Current size in bytes, or -1 if the file cannot be stat'd.
    ///
    /// Queried on each call rather than captured at discovery time.
    pub fn size_bytes(&self) -> i64 {
        file_size_or_unknown(&self.path)
    }
}

impl AsRef<Path> for FileEntry {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Size of `path` in bytes, or -1 if it cannot be stat'd.
pub fn file_size_or_unknown(path: &Path) -> i64 {
    fs::metadata(path)
        .map(|m| i64::try_from(m.len()).unwrap_or(i64::MAX))
        .unwrap_or(-1)
}

/// Lists regular files under `root`.
///
/// - Non-recursive: only the direct children of `root` that are regular files.
/// - Recursive: depth-first walk; a directory whose canonical path was already
///   visited is not descended into again, and directories that fail to list
///   are skipped instead of aborting the walk.
///
/// Returned paths are absolute. Order is unspecified.
pub fn enumerate(root: &Path, recursive: bool) -> Result<Vec<FileEntry>, EnumerateError> {
    let metadata = fs::metadata(root).map_err(|source| EnumerateError::PathUnreadable {
        path: root.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(EnumerateError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let root = std::path::absolute(root).map_err(|source| EnumerateError::PathUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut visited: HashSet<PathBuf> = HashSet::new();

    // follow_links lets symlinked directories be walked; the visited set is
    // what stops cycles, walkdir's own loop detection only reports them.
    let walker = WalkDir::new(&root)
        .follow_links(true)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            match fs::canonicalize(entry.path()) {
                Ok(canonical) => {
                    let first_visit = visited.insert(canonical);
                    if !first_visit {
                        debug!(path = %entry.path().display(), "directory already visited, skipping");
                    }
                    first_visit
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "cannot resolve directory, skipping");
                    false
                }
            }
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if entry.file_type().is_file() {
            files.push(FileEntry::new(entry.into_path()));
        }
    }

    Ok(files)
}
