pub mod api;
pub mod broadcast;
pub mod collector;
pub mod collectors;
pub mod config;
pub mod error;
pub mod git;
pub mod health;
pub mod models;
pub mod report;
pub mod scanner;
pub mod store;
pub mod watcher;

pub use collector::MetricsCollector;
pub use error::{MetricsError, Result};
pub use models::{MetricsSnapshot, RepoSnapshot, RepoStatus};
