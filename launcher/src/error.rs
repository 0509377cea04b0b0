use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use strata_types::AppReference;
use thiserror::Error;

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why an application reference could not be resolved.
#[derive(Debug, Error)]
pub enum Unresolved {
    #[error("module '{module}' not found in [{}]", join_paths(searched))]
    ModuleNotFound {
        module: String,
        searched: Vec<PathBuf>,
    },
    #[error("'{attribute}' is not bound at the top level of {}", file.display())]
    AttributeNotFound { attribute: String, file: PathBuf },
    #[error("cannot read {}: {source}", file.display())]
    Read {
        file: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("{} is not a built strata environment", path.display())]
    EnvironmentMissing { path: PathBuf },
    #[error("cannot resolve application '{reference}': {reason}")]
    ReferenceResolution {
        reference: AppReference,
        #[source]
        reason: Unresolved,
    },
    #[error("cannot bind {addr}: {source}")]
    PortBind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("server program '{program}' not found in {search_path}")]
    ServerNotFound { program: String, search_path: String },
    #[error("failed to load env file {}: {message}", path.display())]
    EnvFile { path: PathBuf, message: String },
    #[error("server exited before accepting connections ({status})")]
    ServerExited { status: ExitStatus },
    #[error("server did not accept connections on {addr} within {}s", timeout.as_secs())]
    StartupTimeout { addr: SocketAddr, timeout: Duration },
    #[error("invalid search path: {0}")]
    SearchPath(#[from] std::env::JoinPathsError),
    #[error("{action}: {source}")]
    Io {
        action: &'static str,
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    pub(crate) fn io(action: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| LaunchError::Io { action, source }
    }
}
