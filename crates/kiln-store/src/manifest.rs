//! Per-job manifest: last-seen input hashes, recipe identity, output hashes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Persisted record of a job's last successful inputs/recipe/outputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub outputs: Option<BTreeMap<String, String>>,
}

impl Manifest {
    fn path_for(cfg_dir: &Path, job_name: &str) -> PathBuf {
        cfg_dir.join(format!("{job_name}.manifest"))
    }

    /// Read a job's manifest, yielding an empty-defaults record when absent.
    pub fn read(cfg_dir: &Path, job_name: &str) -> kiln_core::Result<Self> {
        let path = Self::path_for(cfg_dir, job_name);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| kiln_core::EngineError::Config(format!("{}: {e}", path.display())))
    }

    /// Overwrite the manifest, via temp-file-then-rename for crash safety.
    pub fn write(&self, cfg_dir: &Path, job_name: &str) -> kiln_core::Result<()> {
        std::fs::create_dir_all(cfg_dir)?;
        let path = Self::path_for(cfg_dir, job_name);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| kiln_core::EngineError::Config(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(cfg_dir)?;
        use std::io::Write;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&path)
            .map_err(|e| kiln_core::EngineError::Io(e.error))?;
        Ok(())
    }
}
