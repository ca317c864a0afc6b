//! Runner errors. Per-item failures never reach this level; they are part of
//! the batch report.

use std::path::PathBuf;

use nctrl::error::{BatchError, ConfigError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },

    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{}: {message}", path.display())]
    Input { path: PathBuf, message: String },

    #[error("invalid run config: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("batch worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RunError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RunError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        RunError::Csv {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        RunError::Json {
            path: path.into(),
            source,
        }
    }

    pub fn input(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        RunError::Input {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type RunResult<T> = Result<T, RunError>;
