use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("root directory {0} cannot be read")]
    RootUnreadable(PathBuf),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("git {args} failed: {reason}")]
    Git { args: String, reason: String },

    #[error("git {args} timed out after {after:?}")]
    Timeout { args: String, after: Duration },

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl MetricsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MetricsError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = MetricsError> = std::result::Result<T, E>;
