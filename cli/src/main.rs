//! strata CLI - build stage and runtime stage entry point.
//!
//! ```text
//! build stage:   strata install-deps   (cached dependency layer)
//!                strata install-project
//!                strata export /runtime/venv
//! runtime stage: strata serve          (app.main:app on 0.0.0.0:8000)
//! ```
//!
//! Exit codes: 1 generic failure, 2 usage, 3 lock mismatch, 4 unresolvable
//! application reference, 5 port already bound.

mod commands;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Args, Parser, Subcommand};
use strata_builder::BuildError;
use strata_launcher::LaunchError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const EXIT_FAILURE: u8 = 1;
const EXIT_LOCK_MISMATCH: u8 = 3;
const EXIT_REFERENCE: u8 = 4;
const EXIT_PORT_BIND: u8 = 5;

#[derive(Parser)]
#[command(name = "strata", version)]
#[command(about = "Build a frozen Python environment and serve an ASGI app from it")]
struct Cli {
    /// Project directory containing pyproject.toml and strata.lock
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,
    /// Config file (default: <project>/strata.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Copy)]
struct InstallArgs {
    /// Install without reading or writing the dependency layer cache
    #[arg(long)]
    no_cache: bool,
    /// Print the build report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Install dependencies and the project (both phases)
    Build(InstallArgs),
    /// Install only the locked dependencies (phase one)
    InstallDeps(InstallArgs),
    /// Install dependencies and the project (alias of build)
    InstallProject(InstallArgs),
    /// Check the lock against the project descriptor without installing
    Verify {
        #[arg(long)]
        json: bool,
    },
    /// Copy the built environment into an empty destination
    Export {
        /// Destination directory; must be missing or empty
        dest: PathBuf,
    },
    /// Start the ASGI server and run until SIGINT/SIGTERM
    Serve {
        /// Application reference, `module.path:attribute`
        #[arg(long)]
        app: Option<String>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the tree digest of a directory
    Digest { path: PathBuf },
    /// Remove all but the most recently used dependency layers
    Prune {
        #[arg(long, default_value_t = 3)]
        keep: usize,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_path = std::env::var_os("STRATA_LOG_FILE").map(PathBuf::from);
    if let Some(path) = log_path {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                    .with(env_filter)
                    .init();
                tracing::debug!(path = %path.display(), "Logging initialized");
                return;
            }
            Err(err) => {
                eprintln!("strata: cannot open log file {}: {err}", path.display());
            }
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

/// Map the failure to a process exit code by its root error type.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(build) = cause.downcast_ref::<BuildError>() {
            return match build {
                BuildError::LockMismatch(_) => EXIT_LOCK_MISMATCH,
                _ => EXIT_FAILURE,
            };
        }
        if cause.downcast_ref::<strata_lock::LockMismatch>().is_some() {
            return EXIT_LOCK_MISMATCH;
        }
        if let Some(launch) = cause.downcast_ref::<LaunchError>() {
            return match launch {
                LaunchError::ReferenceResolution { .. } => EXIT_REFERENCE,
                LaunchError::PortBind { .. } => EXIT_PORT_BIND,
                _ => EXIT_FAILURE,
            };
        }
    }
    EXIT_FAILURE
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match commands::run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}
