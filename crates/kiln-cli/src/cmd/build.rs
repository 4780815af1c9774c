//! `fspx build` - materialize `project.json` via the external configurator

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};

use crate::paths::Paths;

pub fn run(config_file: &Path, paths: &Paths) -> Result<()> {
    std::fs::create_dir_all(&paths.cfg_dir)?;

    let out_link = paths.cfg_dir.join("cfg");
    log::info!("building project configuration from {}", config_file.display());

    let status = Command::new("nix-build")
        .arg("nix/project.nix")
        .arg("--arg")
        .arg("config")
        .arg(config_file)
        .arg("--out-link")
        .arg(&out_link)
        .arg("--show-trace")
        .status()
        .context("failed to invoke the project configurator")?;

    std::process::exit(status.code().unwrap_or(1));
}
