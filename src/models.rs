use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File and line totals for one language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageStats {
    pub files: usize,
    pub lines: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub commits: usize,
}

/// History metrics read from the git CLI. Every field degrades to its
/// default independently when the underlying git call fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitMetrics {
    /// Set when the directory has no `.git`; all other fields stay default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub total_commits: usize,
    pub commits_30d: usize,
    pub commits_90d: usize,
    pub contributors: usize,
    pub branches: usize,
    pub tags: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit_author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit_message: Option<String>,
    pub top_contributors: Vec<Contributor>,
}

impl GitMetrics {
    pub fn not_a_repo() -> Self {
        Self {
            error: Some("not a git repo".to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityFinding {
    #[serde(rename = "type")]
    pub kind: String,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoStatus {
    Active,
    Maintenance,
    Archived,
    #[default]
    Empty,
}

impl RepoStatus {
    pub fn label(self) -> &'static str {
        match self {
            RepoStatus::Active => "active",
            RepoStatus::Maintenance => "maintenance",
            RepoStatus::Archived => "archived",
            RepoStatus::Empty => "empty",
        }
    }
}

/// Every metric computed for one repository in one collection run.
///
/// Built fresh by each collection and never mutated afterwards; a newer run
/// replaces the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoSnapshot {
    pub name: String,
    pub path: String,
    pub collected_at: DateTime<Utc>,

    pub total_files: usize,
    pub total_loc: usize,
    pub languages: BTreeMap<String, LanguageStats>,
    /// Empty when no file with a known extension was found.
    pub primary_language: String,

    pub git: GitMetrics,

    pub dependencies: Vec<String>,
    pub dep_count: usize,

    pub security_findings: Vec<SecurityFinding>,
    pub security_score: f64,

    pub has_tests: bool,
    pub test_files: usize,
    pub has_ci: bool,
    pub has_readme: bool,
    pub has_docs: bool,
    pub has_flake: bool,

    pub health_score: f64,
    pub status: RepoStatus,
}

impl RepoSnapshot {
    /// An all-default snapshot for `path`, stamped with the current time.
    pub fn empty(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Self {
            name,
            path: path.to_string_lossy().into_owned(),
            collected_at: Utc::now(),
            total_files: 0,
            total_loc: 0,
            languages: BTreeMap::new(),
            primary_language: String::new(),
            git: GitMetrics::default(),
            dependencies: Vec::new(),
            dep_count: 0,
            security_findings: Vec::new(),
            security_score: 100.0,
            has_tests: false,
            test_files: 0,
            has_ci: false,
            has_readme: false,
            has_docs: false,
            has_flake: false,
            health_score: 0.0,
            status: RepoStatus::Empty,
        }
    }
}

/// The persisted aggregate written by a full scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub generated_at: DateTime<Utc>,
    pub repo_count: usize,
    pub repos: Vec<RepoSnapshot>,
}

impl MetricsSnapshot {
    pub fn new(repos: Vec<RepoSnapshot>) -> Self {
        Self {
            generated_at: Utc::now(),
            repo_count: repos.len(),
            repos,
        }
    }

    pub fn find(&self, name: &str) -> Option<&RepoSnapshot> {
        self.repos.iter().find(|r| r.name == name)
    }
}
