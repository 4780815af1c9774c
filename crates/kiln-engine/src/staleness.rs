//! Staleness checking: decide whether a job's manifest still matches its
//! current inputs, recipe, and store state.

use std::collections::BTreeSet;

use kiln_core::Result;
use kiln_store::{Manifest, Store};

use crate::project::Job;

/// A job is fresh iff its manifest has recorded outputs that all still
/// exist in the store, its recipe is unchanged, and every declared input's
/// live content hash matches the manifest.
pub fn check_job(
    name: &str,
    job: &Job,
    project_root: &std::path::Path,
    cfg_dir: &std::path::Path,
    store: &Store,
) -> Result<bool> {
    let manifest = Manifest::read(cfg_dir, name)?;

    let Some(manifest_outputs) = &manifest.outputs else {
        return Ok(false);
    };

    for output in &job.outputs {
        match manifest_outputs.get(output) {
            Some(hash) if store.root().join(hash).exists() => {}
            _ => return Ok(false),
        }
    }

    let run_script = job.run_script.to_string_lossy().into_owned();
    if manifest.function.as_deref() != Some(run_script.as_str()) {
        return Ok(false);
    }

    for (input_name, pinned) in &job.inputs {
        let Some(recorded) = manifest.inputs.get(input_name) else {
            return Ok(false);
        };

        if let Some(pinned_hash) = pinned {
            if Job::is_output_reference(input_name) {
                let Some(tail) = Job::resolve_output_reference(input_name) else {
                    return Ok(false);
                };
                let output_path = project_root.join("outputs").join(tail);
                match store.hash_from_store_path(&output_path) {
                    Ok(live) if &live == pinned_hash => {}
                    _ => return Ok(false),
                }
            }
            if pinned_hash != recorded {
                return Ok(false);
            }
        }

        let live_hash = if Job::is_output_reference(input_name) {
            let tail = Job::resolve_output_reference(input_name).unwrap_or(input_name);
            let output_path = project_root.join("outputs").join(tail);
            match store.hash_from_store_path(&output_path) {
                Ok(h) => h,
                Err(_) => return Ok(false),
            }
        } else {
            let source_path = std::path::PathBuf::from(kiln_core::envsubst::expand(input_name));
            if !source_path.exists() {
                return Ok(false);
            }
            kiln_store::hash::hash_file(&source_path)?
        };

        if &live_hash != recorded {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Post-order traversal over a jobset; a job is added to the recalculation
/// set if it is itself stale or any descendant is. Returns `(recalc, valid)`
/// where `valid` is `true` iff nothing was recalculated.
pub fn check_jobset(
    jobset: &std::collections::BTreeMap<String, Job>,
    project_root: &std::path::Path,
    cfg_dir: &std::path::Path,
    store: &Store,
) -> Result<(Vec<String>, bool)> {
    let mut recalc = Vec::new();
    let mut visited = BTreeSet::new();
    for (name, job) in jobset {
        visit(name, job, project_root, cfg_dir, store, &mut visited, &mut recalc)?;
    }
    let valid = recalc.is_empty();
    Ok((recalc, valid))
}

fn visit(
    name: &str,
    job: &Job,
    project_root: &std::path::Path,
    cfg_dir: &std::path::Path,
    store: &Store,
    visited: &mut BTreeSet<String>,
    recalc: &mut Vec<String>,
) -> Result<bool> {
    let mut descendant_stale = false;
    for (child_name, child_job) in &job.deps {
        let stale = visit(child_name, child_job, project_root, cfg_dir, store, visited, recalc)?;
        descendant_stale |= stale;
    }

    let self_stale = !check_job(name, job, project_root, cfg_dir, store)?;
    let stale = self_stale || descendant_stale;

    if stale && visited.insert(name.to_string()) {
        recalc.push(name.to_string());
    }

    Ok(stale)
}
