//! Project descriptor + lock file handling for strata.
//!
//! Loading is split from verification: [`ProjectDescriptor`] and [`LockFile`]
//! only parse, [`verify_lock`] decides whether the pair may be installed under
//! frozen semantics and yields the [`InstallPlan`] the builder consumes.

mod descriptor;
mod error;
mod key;
mod lockfile;
mod verify;

pub use descriptor::{DEFAULT_EXCLUDES, ProjectDescriptor};
pub use error::{Discrepancy, LockMismatch, ManifestError};
pub use key::layer_key;
pub use lockfile::{LOCK_VERSION, LockFile, LockedPackage};
pub use verify::{InstallPlan, verify_lock};
