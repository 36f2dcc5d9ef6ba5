//! Utility functions for path derivation and destination housekeeping

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use walkdir::WalkDir;

/// Longest folder name produced by [`safe_folder_name`], in characters
pub const MAX_FOLDER_NAME_CHARS: usize = 80;

/// Folder name used when a playlist name sanitizes to nothing
pub const FALLBACK_FOLDER_NAME: &str = "playlist";

/// Extension the acquisition tool uses for in-progress files
pub const PARTIAL_EXTENSION: &str = "part";

static UNSAFE_RUN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[^\w\-\. ]+").ok());

/// Derive a filesystem-safe subfolder of `base` from a playlist name
///
/// Every run of characters other than word characters, `-`, `.` and space is
/// replaced with `_`, leading and trailing `.`, `_` and spaces are stripped,
/// and the result is truncated to [`MAX_FOLDER_NAME_CHARS`].
///
/// # Examples
///
/// ```
/// use sopti::utils::safe_folder_name;
/// use std::path::Path;
///
/// let dir = safe_folder_name("Chill / Focus", Path::new("/music"));
/// assert_eq!(dir, Path::new("/music/Chill _ Focus"));
///
/// let dir = safe_folder_name("???", Path::new("/music"));
/// assert_eq!(dir, Path::new("/music/playlist"));
/// ```
pub fn safe_folder_name(name: &str, base: &Path) -> PathBuf {
    let replaced = match UNSAFE_RUN.as_ref() {
        Some(re) => re.replace_all(name, "_").into_owned(),
        None => name
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ') {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
    };

    let trimmed = replaced.trim_matches(|c| matches!(c, '.' | '_' | ' '));
    let safe: String = if trimmed.is_empty() {
        FALLBACK_FOLDER_NAME.to_string()
    } else {
        trimmed.chars().take(MAX_FOLDER_NAME_CHARS).collect()
    };

    base.join(safe)
}

/// Whether `input` is an open.spotify.com link
pub fn looks_like_spotify_url(input: &str) -> bool {
    input.starts_with("https://open.spotify.com/")
}

/// Remove leftover partial downloads under `dir`
///
/// Walks the tree and deletes every `*.part` file. Failures to remove a
/// single file are logged and skipped. Returns the number of files removed.
pub fn cleanup_partials(dir: &Path) -> usize {
    if !dir.exists() {
        return 0;
    }

    let mut removed = 0;
    for entry in WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(PARTIAL_EXTENSION)
        {
            continue;
        }

        match std::fs::remove_file(path) {
            Ok(()) => {
                removed += 1;
                tracing::debug!(path = %path.display(), "removed partial file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove partial file");
            }
        }
    }

    removed
}

/// [`cleanup_partials`] over each of `dirs`, on the blocking thread pool
///
/// A track destination can be the whole music library, so the walk never runs
/// on a runtime worker.
pub async fn remove_partials(dirs: Vec<PathBuf>) -> usize {
    let task = tokio::task::spawn_blocking(move || {
        dirs.iter().map(|d| cleanup_partials(d)).sum::<usize>()
    });
    match task.await {
        Ok(removed) => removed,
        Err(e) => {
            tracing::warn!(error = %e, "partial file cleanup task failed");
            0
        }
    }
}
