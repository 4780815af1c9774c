//! Ambient engineering stack shared by the store, engine, and CLI crates:
//! error type, logging, progress reporting, config loading, and environment
//! variable expansion.

pub mod config;
pub mod envsubst;
pub mod error;
pub mod logging;
pub mod progress;

pub use config::Config;
pub use error::{EngineError, Result};
pub use progress::{ProgressContext, SharedProgress};
