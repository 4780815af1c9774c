//! Progress reporting for TTY and non-TTY environments.
//!
//! Jobs run sequentially, so there is only ever one live line, but the
//! shape mirrors a multi-line progress context so the CLI can later grow a
//! `--jobs N` flag without reworking this module.

use std::io::IsTerminal;
use std::sync::Arc;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {prefix:>16.cyan.bold} {wide_msg}")
        .expect("invalid template")
}

/// Central progress context for job lines.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    pub fn new() -> Self {
        let is_tty = std::io::stderr().is_terminal();
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Create a progress line for a job. Hidden (no-op) outside a TTY.
    pub fn job_line(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }

        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(spinner_style());
        pb.set_prefix(name.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        pb
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper, kept for symmetry with the logging bridge even
/// though the engine itself never hands it across a thread boundary.
pub type SharedProgress = Arc<ProgressContext>;
