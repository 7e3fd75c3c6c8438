pub mod code;
pub mod dependencies;
pub mod quality;
pub mod security;
pub mod walk;

pub use code::{code_metrics, CodeMetrics};
pub use dependencies::collect_dependencies;
pub use quality::{collect_quality, QualityIndicators};
pub use security::{scan_files, security_score};

use crate::models::SecurityFinding;
use std::path::Path;

/// Everything the filesystem probes produce for one repository.
#[derive(Debug, Clone, Default)]
pub struct FilesystemMetrics {
    pub code: CodeMetrics,
    pub dependencies: Vec<String>,
    pub security_findings: Vec<SecurityFinding>,
    pub quality: QualityIndicators,
}

/// Run the code, dependency, security and quality probes. Blocking: walks
/// the tree and reads files, so async callers run it on a blocking thread.
pub fn collect_filesystem(repo: &Path) -> FilesystemMetrics {
    let files = walk::repo_files(repo, walk::MAX_FILES_PER_REPO);
    FilesystemMetrics {
        code: code_metrics(&files),
        dependencies: collect_dependencies(repo),
        security_findings: scan_files(repo, &files),
        quality: collect_quality(repo),
    }
}
