//! Environment builder for strata.
//!
//! - **`builder`**: verify, install dependencies (cached layer), install the
//!   project, swap the finished environment into place
//! - **`cache`**: content-addressed dependency layers
//! - **`install`** / **`project`**: file placement and `.dist-info`
//! - **`export`**: copy a finished environment into the runtime stage

mod builder;
mod cache;
mod error;
mod export;
mod install;
mod layout;
mod marker;
mod project;
mod source;

pub use builder::{BuildReport, Builder, CacheOutcome, InstalledSummary};
pub use cache::LayerCache;
pub use error::BuildError;
pub use export::{ExportReport, export_environment};
pub use install::{InstalledPackage, install_package};
pub use layout::{BIN_DIR, EnvironmentLayout, SITE_PACKAGES};
pub use marker::{EnvironmentMarker, InstallScope, MARKER_FILE, MarkerPackage};
pub use project::install_project;
pub use source::{Artifact, DirectoryIndex, PackageSource};
