use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Failed to refresh {}", .path.display())]
    Refresh {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("The refresh coordinator shut down before the pass could run")]
    CoordinatorShutDown,

    #[error("A reconciliation pass cannot be started from inside another pass")]
    Reentrant,

    #[error("Could not read config file {}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigSource,
    },

    #[error("Could not read input file {}", .path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: InputSource,
    },
}

#[derive(Debug, Error)]
pub enum ConfigSource {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum InputSource {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ReconcileError {
    pub(crate) fn refresh(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Refresh {
            path: path.into(),
            source,
        }
    }
}
