//! Core domain types for strata.
//!
//! Pure types with no IO and no async: distribution names, versions and
//! specifiers, requirement strings, content digests, application references,
//! and the resolved settings the config loader produces.

mod app_ref;
mod digest;
mod name;
mod requirement;
pub mod settings;
mod specifier;
mod version;

pub use app_ref::{AppReference, AppReferenceError};
pub use digest::{Digest, DigestParseError};
pub use name::{PackageName, PackageNameError};
pub use requirement::{Requirement, RequirementParseError};
pub use settings::{
    BindAddress, BuildSettings, CachePolicy, DEFAULT_APP, DEFAULT_HOST, DEFAULT_PORT,
    DEFAULT_SERVER, LaunchSettings, ProjectPaths, ServerCommand, SettingsError,
};
pub use specifier::{Operator, Specifier, SpecifierParseError, SpecifierSet};
pub use version::{PreKind, Version, VersionParseError};
