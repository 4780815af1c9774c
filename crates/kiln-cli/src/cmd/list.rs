//! `fspx list` - print each job name on a line

use anyhow::Result;
use kiln_engine::{dag, Project};

pub fn run(project: &Project) -> Result<()> {
    let order = dag::find_all_jobs(&project.deps)?;
    for name in order {
        println!("{name}");
    }
    Ok(())
}
