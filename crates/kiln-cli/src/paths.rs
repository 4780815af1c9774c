//! Project-local filesystem layout, threaded explicitly rather than read
//! from a process-wide constant.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration and manifests root, by default `.fspx/`.
    pub cfg_dir: PathBuf,
    /// Project root, by default the current directory.
    pub project_root: PathBuf,
}

impl Paths {
    pub fn new(cfg_dir: Option<PathBuf>) -> Self {
        Self {
            cfg_dir: cfg_dir.unwrap_or_else(|| PathBuf::from(".fspx")),
            project_root: PathBuf::from("."),
        }
    }

    pub fn project_json(&self) -> PathBuf {
        self.cfg_dir.join("cfg").join("project.json")
    }

    pub fn manifest_dir(&self) -> &Path {
        &self.cfg_dir
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new(None)
    }
}
