use crate::collectors::{collect_filesystem, security_score};
use crate::config::Config;
use crate::error::{MetricsError, Result};
use crate::git::{collect_git_metrics, head_hash};
use crate::health::{classify, health_score};
use crate::models::{MetricsSnapshot, RepoSnapshot};
use crate::scanner;
use crate::store::SnapshotStore;
use std::path::{Path, PathBuf};

/// Zero-token metrics engine: git + filesystem + regex, one instance per
/// process, shared by the CLI, the watcher and the API.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    root: PathBuf,
    skip_repo_names: Vec<String>,
    store: SnapshotStore,
}

impl MetricsCollector {
    pub fn new(config: &Config) -> Self {
        Self {
            root: config.root_dir.clone(),
            skip_repo_names: config.skip_repo_names.clone(),
            store: SnapshotStore::new(config.metrics_dir()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn discover_repos(&self) -> Result<Vec<PathBuf>> {
        scanner::discover_repos(&self.root, &self.skip_repo_names)
    }

    /// Compute a fresh snapshot for one repository.
    ///
    /// Probe failures degrade to default values; the only error is a path
    /// that is not an accessible directory.
    pub async fn collect_repo(&self, repo_path: &Path) -> Result<RepoSnapshot> {
        let meta = std::fs::metadata(repo_path).map_err(|e| MetricsError::io(repo_path, e))?;
        if !meta.is_dir() {
            return Err(MetricsError::NotADirectory(repo_path.to_path_buf()));
        }

        let mut snapshot = RepoSnapshot::empty(repo_path);

        let fs_path = repo_path.to_path_buf();
        let fs_metrics = tokio::task::spawn_blocking(move || collect_filesystem(&fs_path));
        let git = collect_git_metrics(repo_path).await;
        let fs_metrics = fs_metrics.await?;

        snapshot.total_files = fs_metrics.code.total_files;
        snapshot.total_loc = fs_metrics.code.total_loc;
        snapshot.languages = fs_metrics.code.languages;
        snapshot.primary_language = fs_metrics.code.primary_language;

        snapshot.git = git;

        snapshot.dep_count = fs_metrics.dependencies.len();
        snapshot.dependencies = fs_metrics.dependencies;

        snapshot.security_score = security_score(&fs_metrics.security_findings);
        snapshot.security_findings = fs_metrics.security_findings;

        let quality = fs_metrics.quality;
        snapshot.has_tests = quality.has_tests;
        snapshot.test_files = quality.test_files;
        snapshot.has_ci = quality.has_ci;
        snapshot.has_readme = quality.has_readme;
        snapshot.has_docs = quality.has_docs;
        snapshot.has_flake = quality.has_flake;

        snapshot.health_score = health_score(&snapshot);
        snapshot.status = classify(&snapshot.git);
        Ok(snapshot)
    }

    /// Discover and collect every repository, then persist the aggregate.
    /// A repository that fails is logged and left out.
    pub async fn collect_all(&self) -> Result<Vec<RepoSnapshot>> {
        let repos = self.discover_repos()?;
        log::info!("Discovered {} repos under {}", repos.len(), self.root.display());

        let results = self.collect_each(&repos).await;
        self.save_snapshot(&results)?;
        Ok(results)
    }

    /// Collect `repos` in order; failures are logged and left out.
    async fn collect_each(&self, repos: &[PathBuf]) -> Vec<RepoSnapshot> {
        let mut results = Vec::with_capacity(repos.len());
        for path in repos {
            match self.collect_repo(path).await {
                Ok(snapshot) => {
                    log::info!(
                        "collected {}  LoC={}  health={:.0}",
                        snapshot.name,
                        snapshot.total_loc,
                        snapshot.health_score
                    );
                    results.push(snapshot);
                }
                Err(e) => log::error!("failed to collect {}: {}", repo_name(path), e),
            }
        }
        results
    }

    pub fn save_snapshot(&self, repos: &[RepoSnapshot]) -> Result<()> {
        self.store.save(&MetricsSnapshot::new(repos.to_vec()))
    }

    pub async fn get_head_hash(&self, repo_path: &Path) -> String {
        head_hash(repo_path).await
    }

    pub fn load_snapshot(&self) -> Option<MetricsSnapshot> {
        self.store.load()
    }
}

pub fn repo_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("unknown")
}
