//! The project description: a DAG of jobs, read from `project.json`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One computational job: its inputs, outputs, and recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Logical name → either `None` ("compute hash from source") or a
    /// pinned 64-hex content address.
    #[serde(default)]
    pub inputs: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(rename = "runScript")]
    pub run_script: PathBuf,
    #[serde(rename = "checkScript")]
    pub check_script: PathBuf,
    #[serde(rename = "jobLauncher", default)]
    pub job_launcher: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
    pub workdir: PathBuf,
    #[serde(default)]
    pub deps: BTreeMap<String, Job>,
}

impl Job {
    /// `true` iff `name` refers to another job's output (`:job.output`).
    pub fn is_output_reference(name: &str) -> bool {
        name.starts_with(':')
    }

    /// For an output-reference input name `:rest`, the path `outputs/rest`.
    pub fn resolve_output_reference(name: &str) -> Option<&str> {
        name.strip_prefix(':')
    }
}

/// Find a job by name anywhere in a dependency tree.
pub fn find_job<'a>(jobset: &'a BTreeMap<String, Job>, name: &str) -> Option<&'a Job> {
    for (key, job) in jobset {
        if key == name {
            return Some(job);
        }
        if let Some(found) = find_job(&job.deps, name) {
            return Some(found);
        }
    }
    None
}

/// Top-level project description, read-only input to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub dstore: PathBuf,
    pub workdir: PathBuf,
    pub jobsets: BTreeMap<String, Job>,
    /// DAG view used for traversal; distinct from `jobsets` because the
    /// configurator may emit a separate tree-shaped projection.
    pub deps: BTreeMap<String, Job>,
}

impl Project {
    pub fn load(path: &std::path::Path) -> kiln_core::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| kiln_core::EngineError::Config(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job {
            inputs: BTreeMap::from([("x.txt".to_string(), None)]),
            outputs: vec!["y.txt".to_string()],
            run_script: PathBuf::from("/bin/run.sh"),
            check_script: PathBuf::from("/bin/check.sh"),
            job_launcher: None,
            env: None,
            workdir: PathBuf::from("/tmp/work"),
            deps: BTreeMap::new(),
        }
    }

    #[test]
    fn output_reference_detection() {
        assert!(Job::is_output_reference(":A.y.txt"));
        assert!(!Job::is_output_reference("x.txt"));
    }

    #[test]
    fn output_reference_resolution() {
        assert_eq!(Job::resolve_output_reference(":A.y.txt"), Some("A.y.txt"));
        assert_eq!(Job::resolve_output_reference("x.txt"), None);
    }

    #[test]
    fn project_json_roundtrip() {
        let project = Project {
            dstore: PathBuf::from("./dstore"),
            workdir: PathBuf::from("./work"),
            jobsets: BTreeMap::from([("A".to_string(), sample_job())]),
            deps: BTreeMap::from([("A".to_string(), sample_job())]),
        };
        let json = serde_json::to_string(&project).unwrap();
        let parsed: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.jobsets.len(), 1);
        assert!(parsed.jobsets.contains_key("A"));
    }

    #[test]
    fn load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(Project::load(&path).is_err());
    }

    #[test]
    fn find_job_locates_nested_dependency() {
        let mut parent = sample_job();
        parent.deps.insert("B".to_string(), sample_job());
        let jobset = BTreeMap::from([("A".to_string(), parent)]);

        assert!(find_job(&jobset, "B").is_some());
        assert!(find_job(&jobset, "missing").is_none());
    }
}
