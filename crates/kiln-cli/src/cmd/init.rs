//! `fspx init` - scaffold a new project directory

use anyhow::Result;

use crate::paths::Paths;

pub fn run(paths: &Paths) -> Result<()> {
    for dir in ["inputs", "src"] {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::create_dir_all(&paths.cfg_dir)?;
    log::info!("initialized project in {}", paths.project_root.display());
    Ok(())
}
