//! `fspx check` - report which jobs are stale

use anyhow::Result;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use kiln_engine::{dag, staleness, Project};
use kiln_store::Store;

use crate::paths::Paths;

pub fn run(project: &Project, paths: &Paths) -> Result<bool> {
    let store = Store::new(&project.dstore);
    let (recalc, valid) =
        staleness::check_jobset(&project.jobsets, &paths.project_root, paths.manifest_dir(), &store)?;
    let all_jobs = dag::find_all_jobs(&project.deps)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Job").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
        ]);
    for name in &all_jobs {
        let status = if recalc.contains(name) {
            Cell::new("stale").fg(Color::Yellow)
        } else {
            Cell::new("fresh").fg(Color::Green)
        };
        table.add_row(vec![Cell::new(name), status]);
    }
    println!("{table}");

    Ok(valid)
}
