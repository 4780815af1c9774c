//! fspx - content-addressed build engine for scientific job DAGs

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::MultiProgress;

mod cmd;
mod paths;

use kiln_engine::Project;
use paths::Paths;

#[derive(Parser)]
#[command(name = "fspx")]
#[command(about = "Content-addressed build engine for scientific job DAGs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Project config directory (default: ./.fspx)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Create `inputs/`, `src/`, `.fspx/` if absent
    Init,
    /// Materialize `project.json` via the external configurator
    Build { config_file: PathBuf },
    /// Print each job name on a line
    List,
    /// Run the staleness check; exit 1 if anything is stale
    Check,
    /// Run the stale closure, or exactly the named job
    Run {
        job: Option<String>,
        #[arg(short = 'l', long)]
        launcher: Option<String>,
    },
    /// Ensure fresh, then re-run into shadow dirs and compare
    Validate {
        job: Option<String>,
        #[arg(short = 'l', long)]
        launcher: Option<String>,
    },
    /// Stage inputs for a job, then invoke its interactive environment
    Shell { job: String },
    /// Produce a self-contained archive of the project
    Export {
        target_dir: PathBuf,
        target_store: PathBuf,
    },
    /// Run `verify_store` on a data store
    StoreCheck { dstore: PathBuf },
    /// Run `clean_garbage` on a data store
    StoreGc { dstore: PathBuf },
    /// Ingest one file and make `link_name` a GC-rooted symlink to it
    StoreImport { file: PathBuf, link_name: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let multi = MultiProgress::new();
    kiln_core::logging::init_logging(cli.verbose, cli.quiet, Some(&multi));

    let paths = Paths::new(cli.config);

    let exit_code = match cli.command {
        Command::Init => {
            cmd::init::run(&paths)?;
            0
        }
        Command::Build { config_file } => {
            cmd::build::run(&config_file, &paths)?;
            0
        }
        Command::List => {
            let project = Project::load(&paths.project_json())?;
            cmd::list::run(&project)?;
            0
        }
        Command::Check => {
            let project = Project::load(&paths.project_json())?;
            let valid = cmd::check::run(&project, &paths)?;
            if valid {
                0
            } else {
                1
            }
        }
        Command::Run { job, launcher } => {
            let project = Project::load(&paths.project_json())?;
            cmd::run::run(&project, &paths, job.as_deref(), launcher.as_deref())?;
            0
        }
        Command::Validate { job, launcher } => {
            let project = Project::load(&paths.project_json())?;
            let ok = cmd::validate::run(&project, &paths, job.as_deref(), launcher.as_deref())?;
            if ok {
                0
            } else {
                1
            }
        }
        Command::Shell { job } => {
            let project = Project::load(&paths.project_json())?;
            cmd::shell::run(&project, &paths, &job)?;
            0
        }
        Command::Export {
            target_dir,
            target_store,
        } => {
            let project = Project::load(&paths.project_json())?;
            cmd::export::run(&project, &paths, &target_dir, &target_store)?;
            0
        }
        Command::StoreCheck { dstore } => {
            let ok = cmd::store_check::run(&dstore)?;
            if ok {
                0
            } else {
                1
            }
        }
        Command::StoreGc { dstore } => {
            cmd::store_gc::run(&dstore)?;
            0
        }
        Command::StoreImport { file, link_name } => {
            let config = kiln_core::Config::load()?;
            cmd::store_import::run(&config.store.default_dir, &file, &link_name)?;
            0
        }
    };

    std::process::exit(exit_code);
}
