//! Health scoring: a fixed linear model over already-collected metrics.

use crate::models::{GitMetrics, RepoSnapshot, RepoStatus};
use serde::{Deserialize, Serialize};

// Weights must sum to 1.0.
pub const WEIGHT_ACTIVITY: f64 = 0.30;
pub const WEIGHT_DOCS: f64 = 0.20;
pub const WEIGHT_TESTING: f64 = 0.20;
pub const WEIGHT_CI: f64 = 0.15;
pub const WEIGHT_SECURITY: f64 = 0.15;

const ACTIVITY_30D_MULTIPLIER: f64 = 5.0;
const ACTIVITY_30D_BASELINE: f64 = 20.0;
const ACTIVITY_90D_MULTIPLIER: f64 = 2.0;
const ACTIVITY_90D_BASELINE: f64 = 10.0;

const DOC_README_POINTS: f64 = 40.0;
const DOC_DOCS_DIR_POINTS: f64 = 40.0;
const DOC_LOC_THRESHOLD: usize = 100;
const DOC_LOC_POINTS: f64 = 20.0;

const TEST_FILES_HIGH: usize = 20;
const TEST_FILES_MID: usize = 5;

/// The five sub-scores, each in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthBreakdown {
    pub activity: f64,
    pub documentation: f64,
    pub testing: f64,
    pub ci: f64,
    pub security: f64,
}

impl HealthBreakdown {
    pub fn of(snapshot: &RepoSnapshot) -> Self {
        Self {
            activity: activity_score(&snapshot.git),
            documentation: documentation_score(
                snapshot.has_readme,
                snapshot.has_docs,
                snapshot.total_loc,
            ),
            testing: testing_score(snapshot.has_tests, snapshot.test_files),
            ci: if snapshot.has_ci { 100.0 } else { 0.0 },
            security: snapshot.security_score.clamp(0.0, 100.0),
        }
    }

    /// Weighted sum rounded to one decimal place.
    pub fn total(&self) -> f64 {
        let raw = self.activity * WEIGHT_ACTIVITY
            + self.documentation * WEIGHT_DOCS
            + self.testing * WEIGHT_TESTING
            + self.ci * WEIGHT_CI
            + self.security * WEIGHT_SECURITY;
        (raw * 10.0).round() / 10.0
    }
}

pub fn activity_score(git: &GitMetrics) -> f64 {
    if git.commits_30d > 0 {
        (git.commits_30d as f64 * ACTIVITY_30D_MULTIPLIER + ACTIVITY_30D_BASELINE).min(100.0)
    } else if git.commits_90d > 0 {
        (git.commits_90d as f64 * ACTIVITY_90D_MULTIPLIER + ACTIVITY_90D_BASELINE).min(100.0)
    } else {
        0.0
    }
}

pub fn documentation_score(has_readme: bool, has_docs: bool, total_loc: usize) -> f64 {
    let mut score = 0.0;
    if has_readme {
        score += DOC_README_POINTS;
    }
    if has_docs {
        score += DOC_DOCS_DIR_POINTS;
    }
    if total_loc > DOC_LOC_THRESHOLD {
        score += DOC_LOC_POINTS;
    }
    f64::min(score, 100.0)
}

pub fn testing_score(has_tests: bool, test_files: usize) -> f64 {
    if !has_tests {
        0.0
    } else if test_files > TEST_FILES_HIGH {
        100.0
    } else if test_files > TEST_FILES_MID {
        80.0
    } else {
        60.0
    }
}

pub fn health_score(snapshot: &RepoSnapshot) -> f64 {
    HealthBreakdown::of(snapshot).total()
}

/// Classify purely from commit counts.
pub fn classify(git: &GitMetrics) -> RepoStatus {
    if git.total_commits == 0 {
        RepoStatus::Empty
    } else if git.commits_30d > 0 {
        RepoStatus::Active
    } else if git.commits_90d > 0 {
        RepoStatus::Maintenance
    } else {
        RepoStatus::Archived
    }
}
