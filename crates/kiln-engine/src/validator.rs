//! Reproducibility validation: re-run a job into a shadow working directory
//! and compare its output hashes against the manifest, without touching the
//! main store.

use std::path::{Path, PathBuf};

use kiln_core::Result;
use kiln_store::{Manifest, Store};

use crate::project::Job;
use crate::runner;

fn shadow_workdir(workdir: &Path) -> PathBuf {
    let mut name = workdir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push("-validate");
    match workdir.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Re-run `job` into its shadow working directory and compare resulting
/// output hashes to the manifest. Returns `false` (rather than erroring) on
/// a reproducibility mismatch or an unset manifest.
pub fn validate_job(
    name: &str,
    job: &Job,
    project_root: &Path,
    cfg_dir: &Path,
    store: &Store,
    launcher_override: Option<&str>,
) -> Result<bool> {
    let manifest = Manifest::read(cfg_dir, name)?;
    let Some(manifest_outputs) = &manifest.outputs else {
        return Ok(false);
    };

    let shadow_dir = shadow_workdir(&job.workdir);
    std::fs::create_dir_all(&shadow_dir)?;

    let mut shadow_job = job.clone();
    shadow_job.workdir = shadow_dir.clone();

    let inputs = runner::import_input_paths(name, job, project_root, cfg_dir, store)?;
    runner::link_inputs(project_root, &shadow_job, &inputs, store)?;
    runner::execute(&shadow_job, launcher_override)?;

    let mut reproducible = true;
    for output in &job.outputs {
        let path = shadow_dir.join(output);
        let expected = manifest_outputs.get(output);
        let actual = if path.exists() {
            Some(kiln_store::hash::hash_file(&path)?)
        } else {
            None
        };
        if actual.as_ref() != expected {
            log::error!("job {name} output {output} cannot be reproduced");
            reproducible = false;
        }
    }

    if reproducible {
        std::fs::remove_dir_all(&shadow_dir)?;
    }
    Ok(reproducible)
}
