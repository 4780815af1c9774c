//! `fspx validate` - ensure a job is fresh, then re-run it into a shadow
//! working directory and compare output hashes

use anyhow::{bail, Result};
use kiln_engine::{find_job, staleness, validator, Project};
use kiln_store::Store;

use crate::paths::Paths;

pub fn run(
    project: &Project,
    paths: &Paths,
    job_name: Option<&str>,
    launcher: Option<&str>,
) -> Result<bool> {
    let store = Store::new(&project.dstore);

    let names: Vec<String> = match job_name {
        Some(name) => vec![name.to_string()],
        None => kiln_engine::dag::find_all_jobs(&project.deps)?,
    };

    let mut all_ok = true;
    for name in &names {
        let Some(job) = find_job(&project.jobsets, name) else {
            bail!("job '{name}' not found in project");
        };

        if !staleness::check_job(name, job, &paths.project_root, paths.manifest_dir(), &store)? {
            println!("{name}: stale, run it before validating");
            all_ok = false;
            continue;
        }

        let reproducible = validator::validate_job(
            name,
            job,
            &paths.project_root,
            paths.manifest_dir(),
            &store,
            launcher,
        )?;

        if reproducible {
            println!("{name}: reproducible");
        } else {
            println!("{name}: cannot be reproduced");
            all_ok = false;
        }
    }

    Ok(all_ok)
}
