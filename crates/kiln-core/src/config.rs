//! Engine-wide configuration, loaded from `fspx.toml`.
//!
//! Search order: the current directory first, then the OS user config
//! directory, falling back to defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub launcher: LauncherConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Default data store location, used when a project description
    /// omits `dstore` (it normally won't, but CLI subcommands like
    /// `store-check`/`store-gc` need a default when invoked bare).
    pub default_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_dir: PathBuf::from("./dstore"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LauncherConfig {
    /// Default job launcher, overridable per-invocation by `-l`.
    pub default: Option<String>,
}

impl Config {
    pub fn load() -> crate::error::Result<Self> {
        let local = PathBuf::from("fspx.toml");
        if local.exists() {
            return Self::from_file(&local);
        }

        if let Some(dirs) = directories::ProjectDirs::from("", "", "fspx") {
            let user_config = dirs.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::error::EngineError::Config(format!("{}: {e}", path.display())))?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }
}
