//! Job execution: input staging, subprocess invocation, output capture.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use kiln_core::{EngineError, Result};
use kiln_store::{Manifest, Store};

use crate::project::Job;

/// Import a job's inputs into the store and update its manifest in place.
/// Returns the resolved `name -> hash` mapping used for staging.
pub fn import_input_paths(
    name: &str,
    job: &Job,
    project_root: &Path,
    cfg_dir: &Path,
    store: &Store,
) -> Result<BTreeMap<String, String>> {
    let mut manifest = Manifest::read(cfg_dir, name)?;
    let mut manifest_valid = true;

    for (input_name, pinned) in &job.inputs {
        let resolved = if Job::is_output_reference(input_name) {
            let tail = Job::resolve_output_reference(input_name)
                .ok_or_else(|| EngineError::NotFound(input_name.clone()))?;
            let output_path = project_root.join("outputs").join(tail);
            store.hash_from_store_path(&output_path)?
        } else {
            let use_pinned = pinned
                .as_ref()
                .filter(|h| store.root().join(h).exists())
                .cloned();
            match use_pinned {
                Some(h) => h,
                None => {
                    let expanded = kiln_core::envsubst::expand(input_name);
                    let source = std::path::PathBuf::from(expanded);
                    store.copy_to_store(&source)?
                }
            }
        };

        match manifest.inputs.get(input_name) {
            Some(existing) if existing == &resolved => {}
            _ => {
                manifest.inputs.insert(input_name.clone(), resolved.clone());
                manifest_valid = false;
            }
        }
    }

    let run_script = job.run_script.to_string_lossy().into_owned();
    if manifest.function.as_deref() != Some(run_script.as_str()) {
        manifest.function = Some(run_script);
    }

    if !manifest_valid {
        manifest.outputs = None;
    }

    manifest.write(cfg_dir, name)?;
    Ok(manifest.inputs)
}

/// Link each resolved input into `<project_root>/inputs/` (a GC root,
/// relative target) and `<workdir>/inputs/` (ephemeral staging, absolute
/// target).
pub fn link_inputs(
    project_root: &Path,
    job: &Job,
    inputs: &BTreeMap<String, String>,
    store: &Store,
) -> Result<()> {
    let root_inputs = project_root.join("inputs");
    std::fs::create_dir_all(&root_inputs)?;
    std::fs::create_dir_all(job.workdir.join("inputs"))?;

    for (input_name, hash) in inputs {
        let basename = Path::new(input_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input_name.clone());

        let root_link = root_inputs.join(&basename);
        store.link_to_store(&root_link, hash, true, true)?;

        let staging_link = job.workdir.join("inputs").join(&basename);
        store.link_to_store(&staging_link, hash, false, false)?;
    }
    Ok(())
}

/// Run the job's `runScript` (launcher-wrapped) followed by its
/// `checkScript`. `launcher_override`, when present, replaces the job's own
/// `jobLauncher` for this invocation only — recomputed fresh per call, never
/// sticking across jobs.
pub fn execute(job: &Job, launcher_override: Option<&str>) -> Result<()> {
    for recipe in [&job.run_script, &job.check_script] {
        if !is_executable::is_executable(recipe) {
            return Err(EngineError::Config(format!(
                "{} is not executable",
                recipe.display()
            )));
        }
    }

    let effective_launcher = launcher_override.or(job.job_launcher.as_deref());
    let launcher_str = effective_launcher.unwrap_or("").to_string();

    let mut cmd = match effective_launcher {
        Some(launcher) => {
            let mut parts = shell_words::split(launcher)
                .map_err(|e| EngineError::Config(format!("invalid launcher '{launcher}': {e}")))?;
            if parts.is_empty() {
                return Err(EngineError::Config(format!(
                    "launcher '{launcher}' is empty"
                )));
            }
            let program = parts.remove(0);
            let mut cmd = Command::new(program);
            cmd.args(parts);
            cmd.arg(&job.run_script);
            cmd
        }
        None => Command::new(&job.run_script),
    };
    cmd.arg(&job.workdir);
    cmd.arg(shell_words::quote(&launcher_str).into_owned());

    run_to_completion(&mut cmd, "run script")?;

    let mut check = Command::new(&job.check_script);
    check.arg(&job.workdir);
    check.arg(job.outputs.join(" "));
    run_to_completion(&mut check, "check script")?;

    Ok(())
}

fn run_to_completion(cmd: &mut Command, label: &str) -> Result<()> {
    let status = cmd.status()?;
    if !status.success() {
        return Err(EngineError::SubprocessFailed(format!(
            "{label} exited with {status}"
        )));
    }
    Ok(())
}

/// Full per-job cycle: stage inputs, link them, execute, capture outputs.
/// A subprocess failure aborts (propagated as `Err`); a missing output at
/// capture time does not.
pub fn run_job(
    name: &str,
    job: &Job,
    project_root: &Path,
    cfg_dir: &Path,
    store: &Store,
    launcher_override: Option<&str>,
) -> Result<bool> {
    let inputs = import_input_paths(name, job, project_root, cfg_dir, store)?;
    link_inputs(project_root, job, &inputs, store)?;
    execute(job, launcher_override)?;
    capture_outputs(name, job, project_root, cfg_dir, store)
}

/// Ingest a job's declared outputs, update the manifest, and link them into
/// `outputs/` as GC roots. A missing output is non-fatal: it is logged and
/// the manifest is left without a fresh `outputs` record, but execution
/// continues.
pub fn capture_outputs(
    name: &str,
    job: &Job,
    project_root: &Path,
    cfg_dir: &Path,
    store: &Store,
) -> Result<bool> {
    let names: Vec<(String, Option<String>)> =
        job.outputs.iter().map(|o| (o.clone(), None)).collect();

    for (output, _) in &names {
        if !job.workdir.join(output).exists() {
            log::error!("output {output} missing for job {name}");
            let mut manifest = Manifest::read(cfg_dir, name)?;
            manifest.outputs = None;
            manifest.write(cfg_dir, name)?;
            return Ok(false);
        }
    }

    let prefix = format!("{}/", job.workdir.display());
    let hashes = store.import_paths(&names, &prefix)?;

    let outputs_dir = project_root.join("outputs");
    std::fs::create_dir_all(&outputs_dir)?;
    for (output, hash) in &hashes {
        let link = outputs_dir.join(output);
        store.link_to_store(&link, hash, true, true)?;
    }

    let mut manifest = Manifest::read(cfg_dir, name)?;
    manifest.outputs = Some(hashes);
    manifest.write(cfg_dir, name)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn executable_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn import_input_paths_records_plain_input() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        let x_path = dir.path().join("x.txt");
        std::fs::write(&x_path, b"hi\n").unwrap();
        let input_name = x_path.display().to_string();

        let job = Job {
            inputs: BTreeMap::from([(input_name.clone(), None)]),
            outputs: vec![],
            run_script: std::path::PathBuf::from("/bin/true"),
            check_script: std::path::PathBuf::from("/bin/true"),
            job_launcher: None,
            env: None,
            workdir: dir.path().to_path_buf(),
            deps: BTreeMap::new(),
        };

        let resolved = import_input_paths("A", &job, dir.path(), dir.path(), &store).unwrap();
        assert_eq!(
            resolved.get(&input_name),
            Some(&kiln_store::hash::hash_bytes(b"hi\n"))
        );

        let manifest = Manifest::read(dir.path(), "A").unwrap();
        assert!(manifest.outputs.is_none());
    }

    #[test]
    fn execute_runs_script_and_check() {
        let dir = tempfile::tempdir().unwrap();
        let run = executable_script(dir.path(), "run.sh", "#!/bin/sh\nexit 0\n");
        let check = executable_script(dir.path(), "check.sh", "#!/bin/sh\nexit 0\n");

        let job = Job {
            inputs: BTreeMap::new(),
            outputs: vec!["y.txt".to_string()],
            run_script: run,
            check_script: check,
            job_launcher: None,
            env: None,
            workdir: dir.path().to_path_buf(),
            deps: BTreeMap::new(),
        };

        execute(&job, None).unwrap();
    }

    #[test]
    fn execute_propagates_run_script_failure() {
        let dir = tempfile::tempdir().unwrap();
        let run = executable_script(dir.path(), "run.sh", "#!/bin/sh\nexit 1\n");
        let check = executable_script(dir.path(), "check.sh", "#!/bin/sh\nexit 0\n");

        let job = Job {
            inputs: BTreeMap::new(),
            outputs: vec![],
            run_script: run,
            check_script: check,
            job_launcher: None,
            env: None,
            workdir: dir.path().to_path_buf(),
            deps: BTreeMap::new(),
        };

        assert!(matches!(
            execute(&job, None),
            Err(EngineError::SubprocessFailed(_))
        ));
    }

    #[test]
    fn capture_outputs_missing_file_is_non_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));

        let job = Job {
            inputs: BTreeMap::new(),
            outputs: vec!["missing.txt".to_string()],
            run_script: std::path::PathBuf::from("/bin/true"),
            check_script: std::path::PathBuf::from("/bin/true"),
            job_launcher: None,
            env: None,
            workdir: dir.path().to_path_buf(),
            deps: BTreeMap::new(),
        };

        let captured = capture_outputs("A", &job, dir.path(), dir.path(), &store).unwrap();
        assert!(!captured);
    }

    #[test]
    fn capture_outputs_ingests_and_links() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        std::fs::write(dir.path().join("y.txt"), b"out\n").unwrap();

        let job = Job {
            inputs: BTreeMap::new(),
            outputs: vec!["y.txt".to_string()],
            run_script: std::path::PathBuf::from("/bin/true"),
            check_script: std::path::PathBuf::from("/bin/true"),
            job_launcher: None,
            env: None,
            workdir: dir.path().to_path_buf(),
            deps: BTreeMap::new(),
        };

        let captured = capture_outputs("A", &job, dir.path(), dir.path(), &store).unwrap();
        assert!(captured);
        let manifest = Manifest::read(dir.path(), "A").unwrap();
        assert_eq!(
            manifest.outputs.unwrap().get("y.txt"),
            Some(&kiln_store::hash::hash_bytes(b"out\n"))
        );
    }
}
