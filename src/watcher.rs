use crate::collector::{repo_name, MetricsCollector};
use crate::config::Config;
use crate::error::Result;
use crate::git::head_hash;
use crate::models::RepoSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Messages pushed to watcher consumers and API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatchEvent {
    RepoUpdate {
        repo: RepoSnapshot,
        timestamp: DateTime<Utc>,
    },
    MetricsScanComplete {
        repo_count: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Receives an event for every detected HEAD change.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn on_change(&self, event: WatchEvent);
}

#[async_trait]
impl ChangeHandler for mpsc::Sender<WatchEvent> {
    async fn on_change(&self, event: WatchEvent) {
        if self.send(event).await.is_err() {
            log::debug!("change receiver dropped; event discarded");
        }
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ChangeHandler for FnHandler<F>
where
    F: Fn(WatchEvent) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn on_change(&self, event: WatchEvent) {
        (self.0)(event).await
    }
}

/// Wrap an async closure as a [`ChangeHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ChangeHandler>
where
    F: Fn(WatchEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherStatus {
    pub is_running: bool,
    pub tracked_count: usize,
    pub last_update: Option<DateTime<Utc>>,
    pub changes_detected: u64,
    pub poll_interval: u64,
}

/// Cheaply clonable read access to a watcher's counters.
#[derive(Clone)]
pub struct StatusHandle(Arc<Mutex<WatcherStatus>>);

impl StatusHandle {
    fn new(poll_interval: u64) -> Self {
        Self(Arc::new(Mutex::new(WatcherStatus {
            is_running: false,
            tracked_count: 0,
            last_update: None,
            changes_detected: 0,
            poll_interval,
        })))
    }

    fn lock(&self) -> MutexGuard<'_, WatcherStatus> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> WatcherStatus {
        self.lock().clone()
    }
}

/// The polling state machine. Owns the tracked-repo list and the HEAD cache;
/// only the task running it ever mutates them.
pub struct Poller {
    collector: Arc<MetricsCollector>,
    handler: Option<Arc<dyn ChangeHandler>>,
    status: StatusHandle,
    tracked: Vec<PathBuf>,
    head_cache: HashMap<PathBuf, String>,
    poll_count: u64,
    rediscover_every: u64,
    stop: Option<watch::Receiver<bool>>,
}

impl Poller {
    pub fn new(collector: Arc<MetricsCollector>, handler: Option<Arc<dyn ChangeHandler>>) -> Self {
        Self {
            collector,
            handler,
            status: StatusHandle::new(0),
            tracked: Vec::new(),
            head_cache: HashMap::new(),
            poll_count: 0,
            rediscover_every: 1,
            stop: None,
        }
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.tracked
    }

    pub fn status(&self) -> WatcherStatus {
        self.status.status()
    }

    /// Re-run discovery. Newly found repos get their HEAD seeded; repos
    /// already in the cache keep their cached HEAD. Repos no longer found
    /// are forgotten, so a returning repo is seeded afresh.
    pub async fn refresh_repo_list(&mut self) -> Result<()> {
        self.tracked = self.collector.discover_repos()?;
        let live: HashSet<&PathBuf> = self.tracked.iter().collect();
        self.head_cache.retain(|path, _| live.contains(path));
        for repo in &self.tracked {
            if self.head_cache.contains_key(repo) {
                continue;
            }
            let head = head_hash(repo).await;
            if !head.is_empty() {
                self.head_cache.insert(repo.clone(), head);
            }
        }
        self.status.lock().tracked_count = self.tracked.len();
        Ok(())
    }

    /// One loop iteration: periodic re-discovery, then a HEAD check of every repo.
    pub async fn tick(&mut self) -> usize {
        self.poll_count += 1;
        if self.poll_count % self.rediscover_every == 0 {
            if let Err(e) = self.refresh_repo_list().await {
                log::warn!("watcher re-discovery failed: {}", e);
            }
        }
        self.poll_once().await
    }

    /// Check every tracked repo once, in discovery order. Returns the number
    /// of changes detected.
    pub async fn poll_once(&mut self) -> usize {
        let mut changes = 0;
        for repo in self.tracked.clone() {
            if self.stopping() {
                break;
            }
            match self.check_repo(&repo).await {
                Ok(true) => changes += 1,
                Ok(false) => {}
                Err(e) => log::warn!("watcher error for {}: {}", repo_name(&repo), e),
            }
        }
        changes
    }

    fn stopping(&self) -> bool {
        self.stop.as_ref().map_or(false, |rx| *rx.borrow())
    }

    async fn check_repo(&mut self, repo: &Path) -> Result<bool> {
        let current = head_hash(repo).await;
        if current.is_empty() {
            return Ok(false);
        }
        let previous = self.head_cache.insert(repo.to_path_buf(), current.clone());
        let previous = match previous {
            // First observation seeds the cache without counting as a change.
            None => return Ok(false),
            Some(prev) if prev == current => return Ok(false),
            Some(prev) => prev,
        };

        log::info!(
            "Change in {}: {} -> {}",
            repo_name(repo),
            short(&previous),
            short(&current)
        );
        let timestamp = Utc::now();
        {
            let mut status = self.status.lock();
            status.changes_detected += 1;
            status.last_update = Some(timestamp);
        }

        let collector = self.collector.clone();
        let path = repo.to_path_buf();
        let snapshot = tokio::spawn(async move { collector.collect_repo(&path).await }).await??;

        if let Some(handler) = &self.handler {
            handler
                .on_change(WatchEvent::RepoUpdate {
                    repo: snapshot,
                    timestamp,
                })
                .await;
        }
        Ok(true)
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}

struct Running {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Polls every tracked repository's HEAD and re-collects metrics for the
/// ones that moved.
///
/// `stop()` lets an in-flight re-collection finish (and its event be
/// delivered) before the polling task exits; no further repos are checked.
pub struct RepoWatcher {
    collector: Arc<MetricsCollector>,
    handler: Option<Arc<dyn ChangeHandler>>,
    poll_interval: Duration,
    rediscover_every: u64,
    status: StatusHandle,
    running: Option<Running>,
}

impl RepoWatcher {
    pub fn new(collector: Arc<MetricsCollector>, config: &Config) -> Self {
        let poll_interval = config.poll_interval();
        Self {
            collector,
            handler: None,
            poll_interval,
            rediscover_every: config.rediscover_every(),
            status: StatusHandle::new(poll_interval.as_secs()),
            running: None,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn ChangeHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn status(&self) -> WatcherStatus {
        self.status.status()
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Discover repos, seed their HEADs and spawn the polling loop.
    /// Starting a running watcher is a no-op.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut poller = Poller {
            collector: self.collector.clone(),
            handler: self.handler.clone(),
            status: self.status.clone(),
            tracked: Vec::new(),
            head_cache: HashMap::new(),
            poll_count: 0,
            rediscover_every: self.rediscover_every,
            stop: Some(stop_rx.clone()),
        };
        poller.refresh_repo_list().await?;
        let tracked = poller.tracked.len();

        let task = tokio::spawn(poll_loop(poller, self.poll_interval, stop_rx));
        self.running = Some(Running { stop_tx, task });
        self.status.lock().is_running = true;

        log::info!(
            "Watcher started: tracking {} repos (interval {}s)",
            tracked,
            self.poll_interval.as_secs()
        );
        Ok(())
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.stop_tx.send(true);
        if let Err(e) = running.task.await {
            log::warn!("watcher task ended abnormally: {}", e);
        }
        self.status.lock().is_running = false;
        log::info!("Watcher stopped");
    }
}

async fn poll_loop(mut poller: Poller, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
    loop {
        poller.tick().await;
        if *stop_rx.borrow() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop_rx.changed() => break,
        }
    }
}
