//! `fspx run` - execute the stale job closure, or one named job

use anyhow::{bail, Result};
use kiln_core::ProgressContext;
use kiln_engine::{find_job, runner, staleness, Project};
use kiln_store::Store;

use crate::paths::Paths;

pub fn run(
    project: &Project,
    paths: &Paths,
    job_name: Option<&str>,
    launcher: Option<&str>,
) -> Result<()> {
    let store = Store::new(&project.dstore);
    let progress = ProgressContext::new();

    let names: Vec<String> = match job_name {
        Some(name) => vec![name.to_string()],
        None => {
            let (recalc, valid) = staleness::check_jobset(
                &project.jobsets,
                &paths.project_root,
                paths.manifest_dir(),
                &store,
            )?;
            if valid {
                println!("Nothing to do.");
                return Ok(());
            }
            recalc
        }
    };

    for name in &names {
        let Some(job) = find_job(&project.jobsets, name) else {
            bail!("job '{name}' not found in project");
        };

        let bar = progress.job_line(name);
        bar.set_message("running");
        log::info!("running job {name}");

        let captured = runner::run_job(
            name,
            job,
            &paths.project_root,
            paths.manifest_dir(),
            &store,
            launcher,
        )?;

        if captured {
            bar.finish_with_message("done");
        } else {
            bar.finish_with_message("output missing");
        }
    }

    Ok(())
}
