//! Runtime launcher for strata environments.
//!
//! Starts exactly one ASGI server process for a resolved `module:attr`
//! reference, bound to a fixed address, and supervises it until a
//! termination signal arrives. The launcher never mutates its own process
//! environment; everything the server needs is passed to the child.

mod error;
mod launcher;
mod port;
mod process;
mod reference;
mod search_path;

pub use error::{LaunchError, Unresolved};
pub use launcher::{
    LaunchConfig, Launcher, Lifecycle, PreparedLaunch, ShutdownReason, ShutdownSignals,
    Termination,
};
pub use port::{ensure_port_free, wait_until_accepting};
pub use process::ServerProcess;
pub use reference::{ResolvedApp, binds_top_level, resolve_reference};
pub use search_path::SearchPath;
