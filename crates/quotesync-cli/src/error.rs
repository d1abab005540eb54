use std::path::PathBuf;

use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] quotesync_core::ValidationError),

    #[error("invalid manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error(transparent)]
    Config(#[from] quotesync_core::ConfigError),

    #[error(transparent)]
    Fetch(#[from] quotesync_core::FetchError),

    #[error("{failed} of {total} quotes failed to reconcile")]
    ReconcileFailed { failed: usize, total: usize },

    #[error(transparent)]
    Controller(#[from] quotesync_core::ControllerError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Manifest { .. } => 2,
            Self::Config(_) => 2,
            Self::Fetch(_) => 3,
            Self::ReconcileFailed { .. } => 3,
            Self::Controller(_) => 5,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
