//! `fspx export` - produce a self-contained archive of the project

use std::path::Path;

use anyhow::Result;
use kiln_engine::{export, Project};

use crate::paths::Paths;

pub fn run(project: &Project, paths: &Paths, to_dir: &Path, target_store: &Path) -> Result<()> {
    let frozen = export::export_project(project, paths.manifest_dir(), to_dir, target_store)?;
    println!(
        "exported {} jobs to {}",
        frozen.jobsets.len(),
        to_dir.display()
    );
    Ok(())
}
