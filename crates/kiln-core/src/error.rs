//! Common error type for the build engine

use std::path::PathBuf;

/// Error produced by any engine component (CAS, manifest store, DAG,
/// staleness checker, runner, validator, exporter).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{path} is not inside store {store}")]
    NotInStore { path: PathBuf, store: PathBuf },

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("subprocess failed: {0}")]
    SubprocessFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
