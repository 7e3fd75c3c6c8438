use crate::scanner::is_skipped_dir;
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};

/// Deepest directory level (below the repo root) whose files are visited.
const MAX_DEPTH: usize = 7;
/// Files at or above this size are never read.
const MAX_FILE_BYTES: u64 = 5_000_000;
/// Safety valve for pathological (data-heavy) repositories.
pub const MAX_FILES_PER_REPO: usize = 80_000;

/// Every regular file under `root` that the extractors look at: hidden
/// entries, skip-listed directories and files of 5 MB or more are left out.
/// Stops after `limit` files. Unreadable directories are skipped.
///
/// Ignore files are not consulted; metrics cover what is on disk.
pub fn repo_files(root: &Path, limit: usize) -> Vec<PathBuf> {
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .hidden(true)
        .follow_links(true)
        .max_depth(Some(MAX_DEPTH + 1))
        .sort_by_file_name(|a, b| a.cmp(b));
    builder.filter_entry(|entry| {
        entry.depth() == 0 || !is_skipped_dir(&entry.file_name().to_string_lossy())
    });

    let mut files = Vec::new();
    for result in builder.build() {
        if files.len() >= limit {
            break;
        }
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("walk error under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        match entry.metadata() {
            Ok(meta) if meta.len() < MAX_FILE_BYTES => files.push(entry.into_path()),
            Ok(meta) => log::debug!(
                "Skipping large file {} ({} bytes)",
                entry.path().display(),
                meta.len()
            ),
            Err(_) => {}
        }
    }
    files
}

/// Lower-cased extension including the dot (`.rs`), or empty.
pub fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Read a file as text, replacing invalid UTF-8.
pub fn read_lossy(path: &Path) -> Option<String> {
    fs::read(path)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
