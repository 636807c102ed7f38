//! Destination path construction.
//!
//! Two mutually exclusive policies:
//! - suffix override: `/media/movie.mkv` + `.out` -> `/media/movie.mkv.out`
//! - marker insertion: `/media/movie.mkv` -> `/media/movie.hevc.mkv`, with an
//!   optional rename to an `.mp4` container (`/media/movie.hevc.mp4`).

use crate::config::Config;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// How destination paths are derived from source paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPolicy {
    /// Appended verbatim to the source path when set.
    pub suffix_override: Option<String>,
    /// Inserted before the final extension, e.g. `.hevc`.
    pub marker: String,
    /// Rename the container to mp4 (ignored with a suffix override).
    pub force_mp4: bool,
    /// Lower-case video extensions that the mp4 rename replaces outright.
    pub video_extensions: Vec<String>,
}

impl NamingPolicy {
    pub fn from_config(cfg: &Config, suffix_override: Option<String>) -> Self {
        Self {
            suffix_override,
            marker: cfg.encode.effective_marker(),
            force_mp4: cfg.encode.force_mp4_container,
            video_extensions: cfg
                .scan
                .video_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Computes the destination for `source`.
    ///
    /// Paths without a rewritable final name (`.`, `..`, a bare root, a
    /// trailing separator) are returned unchanged.
    pub fn destination_for(&self, source: &Path) -> PathBuf {
        if let Some(suffix) = &self.suffix_override {
            let mut dest = source.as_os_str().to_owned();
            dest.push(suffix);
            return PathBuf::from(dest);
        }

        if !has_rewritable_name(source) {
            return source.to_path_buf();
        }
        let Some(file_name) = source.file_name() else {
            return source.to_path_buf();
        };

        let mut name = insert_marker(file_name, &self.marker);
        if self.force_mp4 {
            name = self.force_mp4_container(&name);
        }
        source.with_file_name(name)
    }

    fn is_video_extension(&self, ext: &OsStr) -> bool {
        ext.to_str()
            .map(|e| {
                let lower = e.to_lowercase();
                self.video_extensions.iter().any(|v| *v == lower)
            })
            .unwrap_or(false)
    }

    fn force_mp4_container(&self, name: &OsStr) -> OsString {
        let as_path = Path::new(name);
        match (as_path.file_stem(), as_path.extension()) {
            (Some(stem), Some(ext)) if self.is_video_extension(ext) => {
                let mut renamed = stem.to_owned();
                renamed.push(".mp4");
                renamed
            }
            _ => {
                let mut renamed = name.to_owned();
                renamed.push(".mp4");
                renamed
            }
        }
    }
}

/// `movie.mkv` -> `movie<marker>.mkv`; names without an extension get the
/// marker appended (`.profile` -> `.profile<marker>`).
fn insert_marker(file_name: &OsStr, marker: &str) -> OsString {
    let as_path = Path::new(file_name);
    match (as_path.file_stem(), as_path.extension()) {
        (Some(stem), Some(ext)) => {
            let mut name = stem.to_owned();
            name.push(marker);
            name.push(".");
            name.push(ext);
            name
        }
        _ => {
            let mut name = file_name.to_owned();
            name.push(marker);
            name
        }
    }
}

fn has_rewritable_name(path: &Path) -> bool {
    let raw = path.to_string_lossy();
    if raw.is_empty() || raw.ends_with('/') || raw.ends_with(std::path::MAIN_SEPARATOR) {
        return false;
    }
    let last = raw
        .rsplit(|c| c == '/' || c == std::path::MAIN_SEPARATOR)
        .next()
        .unwrap_or("");
    !matches!(last, "" | "." | "..")
}
