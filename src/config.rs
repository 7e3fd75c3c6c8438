use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `root_dir` from the config file.
pub const ROOT_ENV: &str = "REPOPULSE_ROOT";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_root")]
    pub root_dir: PathBuf,

    /// Where the snapshot file lives. Defaults to `<root_dir>/.repopulse/metrics`.
    #[serde(default)]
    pub metrics_dir: Option<PathBuf>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_rediscover_interval")]
    pub rediscover_interval_secs: u64,

    /// Repository directory names that are never tracked, even with a `.git`.
    #[serde(default = "default_skip_repo_names")]
    pub skip_repo_names: Vec<String>,

    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: default_root(),
            metrics_dir: None,
            poll_interval_secs: default_poll_interval(),
            rediscover_interval_secs: default_rediscover_interval(),
            skip_repo_names: default_skip_repo_names(),
            bind: default_bind(),
        }
    }
}

impl Config {
    /// A default config rooted at `root`, handy for tests and one-off runs.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root.into(),
            ..Self::default()
        }
    }

    pub fn metrics_dir(&self) -> PathBuf {
        self.metrics_dir
            .clone()
            .unwrap_or_else(|| self.root_dir.join(".repopulse").join("metrics"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Number of polling iterations between two re-discoveries (at least 1).
    pub fn rediscover_every(&self) -> u64 {
        (self.rediscover_interval_secs / self.poll_interval_secs.max(1)).max(1)
    }
}

fn default_root() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join("arch")
}

fn default_poll_interval() -> u64 {
    10
}

fn default_rediscover_interval() -> u64 {
    60
}

pub fn default_skip_repo_names() -> Vec<String> {
    ["ux-agents", "forge-std", "sdk-core"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_bind() -> String {
    "127.0.0.1:8765".to_string()
}

/// Default config file location: `~/.config/repopulse/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".config")
        .join("repopulse")
        .join("config.toml")
}

/// Load config, creating a default file on first run if none exists.
/// `REPOPULSE_ROOT` wins over the file's `root_dir`.
pub fn load_config(config_path: Option<&PathBuf>) -> Result<Config> {
    let mut config = read_config_file(config_path)?;
    if let Ok(root) = std::env::var(ROOT_ENV) {
        if !root.trim().is_empty() {
            config.root_dir = PathBuf::from(root);
        }
    }
    let home = dirs::home_dir().unwrap_or_default();
    config.root_dir = expand_home(config.root_dir, &home);
    config.metrics_dir = config.metrics_dir.map(|p| expand_home(p, &home));
    Ok(config)
}

fn read_config_file(config_path: Option<&PathBuf>) -> Result<Config> {
    let path = config_path.cloned().unwrap_or_else(default_config_path);

    if !path.exists() {
        // Ignore errors (e.g. read-only path); defaults still apply.
        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_ok() {
                let _ = std::fs::write(&path, default_config_toml());
            }
        }
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(&path)?;
    Ok(toml::from_str(&contents)?)
}

/// Expand `~` and `$HOME` prefixes to the actual home directory.
fn expand_home(path: PathBuf, home: &Path) -> PathBuf {
    let s = path.to_string_lossy();

    if let Some(stripped) = s.strip_prefix("~/") {
        return home.join(stripped);
    }
    if s == "~" {
        return home.to_path_buf();
    }
    if let Some(stripped) = s.strip_prefix("$HOME/") {
        return home.join(stripped);
    }
    if s == "$HOME" {
        return home.to_path_buf();
    }

    path
}

fn default_config_toml() -> &'static str {
    r#"# repopulse configuration
# ~/.config/repopulse/config.toml

# Directory whose projects (and project/service sub-directories) are scanned
# for git repositories. Supports ~ and $HOME expansion.
# REPOPULSE_ROOT overrides this value.
root_dir = "~/arch"

# Where metrics_snapshot.json is written. Defaults to <root_dir>/.repopulse/metrics.
# metrics_dir = "~/.local/share/repopulse"

# How often the watcher checks each repository's HEAD (seconds).
poll_interval_secs = 10

# How often the watcher re-discovers repositories (seconds).
rediscover_interval_secs = 60

# Repository directory names that are never tracked.
skip_repo_names = ["ux-agents", "forge-std", "sdk-core"]

# Listen address for `repopulse serve`.
bind = "127.0.0.1:8765"
"#
}
