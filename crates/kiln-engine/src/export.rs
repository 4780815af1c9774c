//! Archive export: rewrite the project description with frozen hashes,
//! copy referenced blobs to a target store, and package recipe closures.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use kiln_core::{EngineError, Result};
use kiln_store::{Manifest, Store};
use serde::Serialize;

use crate::project::{Job, Project};

/// A job with every input/output hash frozen from its manifest; no
/// `workdir`, since it has no meaning outside the original project tree.
#[derive(Debug, Clone, Serialize)]
pub struct FrozenJob {
    pub inputs: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
    #[serde(rename = "runScript")]
    pub run_script: PathBuf,
    #[serde(rename = "checkScript")]
    pub check_script: PathBuf,
    #[serde(rename = "jobLauncher")]
    pub job_launcher: Option<String>,
    pub env: Option<String>,
    pub deps: BTreeMap<String, FrozenJob>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrozenProject {
    pub dstore: PathBuf,
    pub jobsets: BTreeMap<String, FrozenJob>,
}

fn freeze_job(name: &str, job: &Job, cfg_dir: &Path) -> Result<FrozenJob> {
    let manifest = Manifest::read(cfg_dir, name)?;

    let mut inputs = BTreeMap::new();
    for (input_name, pinned) in &job.inputs {
        let hash = match pinned {
            Some(h) => h.clone(),
            None => manifest.inputs.get(input_name).cloned().ok_or_else(|| {
                EngineError::NotFound(format!("no recorded hash for input '{input_name}' of job '{name}'"))
            })?,
        };
        inputs.insert(input_name.clone(), hash);
    }

    let manifest_outputs = manifest.outputs.clone().unwrap_or_default();
    let mut outputs = BTreeMap::new();
    for output in &job.outputs {
        let hash = manifest_outputs.get(output).cloned().ok_or_else(|| {
            EngineError::NotFound(format!("no recorded hash for output '{output}' of job '{name}'"))
        })?;
        outputs.insert(output.clone(), hash);
    }

    let mut deps = BTreeMap::new();
    for (dep_name, dep_job) in &job.deps {
        deps.insert(dep_name.clone(), freeze_job(dep_name, dep_job, cfg_dir)?);
    }

    Ok(FrozenJob {
        inputs,
        outputs,
        run_script: job.run_script.clone(),
        check_script: job.check_script.clone(),
        job_launcher: job.job_launcher.clone(),
        env: job.env.clone(),
        deps,
    })
}

fn ensure_blob_copied(source: &Store, target: &Store, hash: &str) -> Result<()> {
    let dest = target.root().join(hash);
    if dest.exists() {
        return Ok(());
    }
    fs::create_dir_all(target.root())?;
    fs::copy(source.root().join(hash), &dest)?;

    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(&dest)?.permissions();
    perms.set_mode(perms.mode() & !0o222);
    fs::set_permissions(&dest, perms)?;
    Ok(())
}

fn copy_job_files(
    jobs: &BTreeMap<String, FrozenJob>,
    source: &Store,
    target: &Store,
    to_dir: &Path,
) -> Result<()> {
    for job in jobs.values() {
        for (name, hash) in &job.inputs {
            ensure_blob_copied(source, target, hash)?;
            let basename = Path::new(name)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.clone());
            target.link_to_store(&to_dir.join("inputs").join(basename), hash, true, true)?;
        }
        for (name, hash) in &job.outputs {
            ensure_blob_copied(source, target, hash)?;
            target.link_to_store(&to_dir.join("outputs").join(name), hash, true, true)?;
        }
        copy_job_files(&job.deps, source, target, to_dir)?;
    }
    Ok(())
}

fn collect_recipe_paths(jobs: &BTreeMap<String, FrozenJob>, out: &mut BTreeSet<PathBuf>) {
    for job in jobs.values() {
        out.insert(job.run_script.clone());
        out.insert(job.check_script.clone());
        if let Some(launcher) = &job.job_launcher {
            if let Ok(mut parts) = shell_words::split(launcher) {
                if !parts.is_empty() {
                    out.insert(PathBuf::from(parts.remove(0)));
                }
            }
        }
        collect_recipe_paths(&job.deps, out);
    }
}

/// Without an external derivation system, the recipe closure degenerates to
/// the run/check/launcher paths named directly by the project. Each is
/// exported as its own opaque blob.
fn export_recipe_closure(paths: &BTreeSet<PathBuf>, target: &Store, to_dir: &Path) -> Result<()> {
    let nar_dir = to_dir.join("nar");
    fs::create_dir_all(&nar_dir)?;
    for path in paths {
        if !path.exists() {
            log::warn!("recipe closure path {} does not exist, skipping", path.display());
            continue;
        }
        let hash = target.copy_to_store(path)?;
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| hash.clone());
        target.link_to_store(&nar_dir.join(format!("{basename}.nar")), &hash, true, true)?;
    }
    Ok(())
}

/// Export a fully self-contained archive of `project` into `to_dir`,
/// backed by a (possibly new) store at `target_store_path`.
pub fn export_project(
    project: &Project,
    cfg_dir: &Path,
    to_dir: &Path,
    target_store_path: &Path,
) -> Result<FrozenProject> {
    let source_store = Store::new(&project.dstore);
    let target_store = Store::new(target_store_path);

    fs::create_dir_all(to_dir)?;
    fs::create_dir_all(to_dir.join("inputs"))?;
    fs::create_dir_all(to_dir.join("outputs"))?;
    fs::create_dir_all(target_store_path)?;

    let mut jobsets = BTreeMap::new();
    for (name, job) in &project.jobsets {
        jobsets.insert(name.clone(), freeze_job(name, job, cfg_dir)?);
    }

    copy_job_files(&jobsets, &source_store, &target_store, to_dir)?;

    let mut recipe_paths = BTreeSet::new();
    collect_recipe_paths(&jobsets, &mut recipe_paths);
    export_recipe_closure(&recipe_paths, &target_store, to_dir)?;

    let dstore_rel = pathdiff::diff_paths(target_store_path, to_dir)
        .unwrap_or_else(|| target_store_path.to_path_buf());
    let frozen = FrozenProject {
        dstore: dstore_rel,
        jobsets,
    };

    let json = serde_json::to_vec_pretty(&frozen)
        .map_err(|e| EngineError::Config(e.to_string()))?;
    let config_hash = target_store.import_data(&json)?;
    target_store.link_to_store(&to_dir.join("config.json"), &config_hash, true, true)?;

    Ok(frozen)
}
