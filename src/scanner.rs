use crate::error::{MetricsError, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory names never descended into, during discovery or file walks.
pub static SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    ".venv",
    "venv",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".cache",
    ".nix-profile",
    "result",
    ".pytest_cache",
    ".nix-pip",
    ".archive",
    ".next",
];

/// Top-level entries of the root that are never projects.
static SKIP_TOP: &[&str] = &["scripts", "docs", "skills"];

/// Levels below a top-level project that are still checked for `.git`.
const NESTED_LEVELS: usize = 2;

pub fn is_skipped_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name)
}

/// Find git repositories under `root`: top-level projects plus up to two
/// nested levels (project/service monorepo layouts).
///
/// Results keep sorted discovery order and are de-duplicated by resolved
/// path. Only an unreadable `root` is an error; unreadable sub-directories
/// are skipped.
pub fn discover_repos(root: &Path, skip_repo_names: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(MetricsError::RootUnreadable(root.to_path_buf()));
    }
    let tops = sorted_subdirs(root).map_err(|e| MetricsError::io(root, e))?;

    let mut found = Found {
        seen: HashSet::new(),
        repos: Vec::new(),
        skip_names: skip_repo_names,
    };

    for top in tops {
        let name = dir_name(&top);
        if name.starts_with('.') || SKIP_TOP.contains(&name) {
            continue;
        }
        if top.join(".git").exists() {
            found.add(&top);
        }
        // Nested repos are looked for even under a repo (monorepo services).
        scan_nested(&top, 1, &mut found);
    }

    Ok(found.repos)
}

struct Found<'a> {
    seen: HashSet<PathBuf>,
    repos: Vec<PathBuf>,
    skip_names: &'a [String],
}

impl Found<'_> {
    fn add(&mut self, path: &Path) {
        let name = dir_name(path);
        if self.skip_names.iter().any(|s| s == name) {
            return;
        }
        let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if self.seen.insert(resolved) {
            self.repos.push(path.to_path_buf());
        }
    }
}

fn scan_nested(dir: &Path, level: usize, found: &mut Found<'_>) {
    if level > NESTED_LEVELS {
        return;
    }
    let subdirs = match sorted_subdirs(dir) {
        Ok(s) => s,
        Err(_) => return, // permission denied or similar; skip
    };

    for sub in subdirs {
        let name = dir_name(&sub);
        if name.starts_with('.') || is_skipped_dir(name) {
            continue;
        }
        if sub.join(".git").exists() {
            found.add(&sub);
        }
        scan_nested(&sub, level + 1, found);
    }
}

fn sorted_subdirs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}
