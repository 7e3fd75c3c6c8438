use crate::scanner::is_skipped_dir;
use ignore::WalkBuilder;
use std::path::Path;

const README_NAMES: &[&str] = &["README.md", "README.rst", "README"];
const MAX_TEST_FILES: usize = 5_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualityIndicators {
    pub has_readme: bool,
    pub has_docs: bool,
    pub has_flake: bool,
    pub has_ci: bool,
    pub has_tests: bool,
    pub test_files: usize,
}

pub fn collect_quality(repo: &Path) -> QualityIndicators {
    let has_ci = repo.join(".github").join("workflows").exists()
        || repo.join(".gitlab-ci.yml").exists()
        || repo.join("Jenkinsfile").exists();

    let tests_dir = ["tests", "test"]
        .iter()
        .map(|d| repo.join(d))
        .find(|p| p.exists());

    let test_files = tests_dir
        .as_deref()
        .map(|dir| count_files(dir, MAX_TEST_FILES))
        .unwrap_or(0);

    QualityIndicators {
        has_readme: README_NAMES.iter().any(|f| repo.join(f).exists()),
        has_docs: repo.join("docs").exists(),
        has_flake: repo.join("flake.nix").exists(),
        has_ci,
        has_tests: tests_dir.is_some(),
        test_files,
    }
}

/// Regular files under `dir`, skip-listed directories excluded, up to `limit`.
fn count_files(dir: &Path, limit: usize) -> usize {
    let mut builder = WalkBuilder::new(dir);
    builder.standard_filters(false).follow_links(true);
    builder.filter_entry(|entry| {
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        entry.depth() == 0 || !is_dir || !is_skipped_dir(&entry.file_name().to_string_lossy())
    });

    builder
        .build()
        .flatten()
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .take(limit)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn bare_directory_has_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(collect_quality(tmp.path()), QualityIndicators::default());
    }

    #[test]
    fn detects_indicators_and_counts_tests() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("README.rst"), "demo").unwrap();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("flake.nix"), "{}").unwrap();
        fs::create_dir_all(root.join(".github/workflows")).unwrap();
        fs::create_dir_all(root.join("test/unit")).unwrap();
        fs::create_dir_all(root.join("test/__pycache__")).unwrap();
        fs::write(root.join("test/test_a.py"), "").unwrap();
        fs::write(root.join("test/unit/test_b.py"), "").unwrap();
        fs::write(root.join("test/__pycache__/test_a.pyc"), "").unwrap();

        let q = collect_quality(root);
        assert!(q.has_readme && q.has_docs && q.has_flake && q.has_ci && q.has_tests);
        assert_eq!(q.test_files, 2);
    }

    #[test]
    fn test_file_count_stops_at_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let tests = tmp.path().join("tests");
        fs::create_dir_all(tests.join("nested")).unwrap();
        for i in 0..4 {
            fs::write(tests.join(format!("test_{}.py", i)), "").unwrap();
            fs::write(tests.join("nested").join(format!("test_{}.py", i)), "").unwrap();
        }
        assert_eq!(count_files(&tests, 5), 5);
        assert_eq!(count_files(&tests, MAX_TEST_FILES), 8);
    }

    #[test]
    fn gitlab_and_jenkins_count_as_ci() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("Jenkinsfile"), "pipeline {}").unwrap();
        assert!(collect_quality(tmp.path()).has_ci);
    }
}
