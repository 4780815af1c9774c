//! `fspx shell` - stage a job's inputs, then drop into its interactive
//! environment

use std::process::Command;

use anyhow::{bail, Context, Result};
use kiln_engine::{find_job, runner, Project};
use kiln_store::Store;

use crate::paths::Paths;

pub fn run(project: &Project, paths: &Paths, job_name: &str) -> Result<()> {
    let store = Store::new(&project.dstore);
    let Some(job) = find_job(&project.jobsets, job_name) else {
        bail!("job '{job_name}' not found in project");
    };

    let inputs =
        runner::import_input_paths(job_name, job, &paths.project_root, paths.manifest_dir(), &store)?;
    runner::link_inputs(&paths.project_root, job, &inputs, &store)?;

    let Some(env) = &job.env else {
        bail!("job '{job_name}' has no environment configured");
    };

    log::info!("starting shell for job {job_name} (env: {env})");
    let status = Command::new("nix-shell")
        .arg("-p")
        .arg(env)
        .status()
        .context("failed to start interactive environment")?;

    std::process::exit(status.code().unwrap_or(1));
}
