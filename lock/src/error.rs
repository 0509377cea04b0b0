use std::path::PathBuf;

use strata_types::{PackageName, Requirement, Version};
use thiserror::Error;

/// The project descriptor or lock file could not be read or understood.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{} has no [project] table", path.display())]
    MissingProject { path: PathBuf },
    #[error("{}: invalid {field}: {message}", path.display())]
    Invalid {
        path: PathBuf,
        field: &'static str,
        message: String,
    },
    #[error("{}: '{name}' is declared more than once in project.dependencies", path.display())]
    DuplicateRequirement { path: PathBuf, name: PackageName },
}

impl ManifestError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ManifestError::Read { path, .. }
            | ManifestError::Parse { path, .. }
            | ManifestError::MissingProject { path }
            | ManifestError::Invalid { path, .. }
            | ManifestError::DuplicateRequirement { path, .. } => path,
        }
    }
}

/// One way in which a lock file fails to reproduce the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Discrepancy {
    #[error("lock file is missing")]
    MissingLock,
    #[error("lock format version {found} is not supported (expected 1)")]
    UnsupportedVersion { found: u32 },
    #[error(
        "lock was resolved from different requirements (added: [{}], removed: [{}])",
        added.join(", "),
        removed.join(", ")
    )]
    Stale {
        added: Vec<String>,
        removed: Vec<String>,
    },
    #[error("'{requirement}' has no locked package")]
    Unlocked { requirement: Requirement },
    #[error("'{requirement}' is not satisfied by locked version {locked}")]
    Unsatisfied {
        requirement: Requirement,
        locked: Version,
    },
    #[error("locked package '{package}' depends on '{dependency}', which is not locked")]
    UnlockedTransitive {
        package: PackageName,
        dependency: PackageName,
    },
    #[error("locked package '{name}=={version}' is not required by the project")]
    Extraneous { name: PackageName, version: Version },
    #[error("'{name}' is locked more than once")]
    Duplicate { name: PackageName },
    #[error("the project '{name}' must not appear among its own locked packages")]
    SelfDependency { name: PackageName },
}

/// Frozen install refused: the lock does not exactly satisfy the descriptor.
///
/// Carries every discrepancy found, in a stable order, so one run shows the
/// whole problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("lock file {} does not satisfy the manifest: {}", lock_path.display(), summarize(discrepancies))]
pub struct LockMismatch {
    lock_path: PathBuf,
    discrepancies: Vec<Discrepancy>,
}

fn summarize(discrepancies: &[Discrepancy]) -> String {
    discrepancies
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl LockMismatch {
    #[must_use]
    pub fn new(lock_path: impl Into<PathBuf>, discrepancies: Vec<Discrepancy>) -> Self {
        Self {
            lock_path: lock_path.into(),
            discrepancies,
        }
    }

    #[must_use]
    pub fn lock_path(&self) -> &PathBuf {
        &self.lock_path
    }

    #[must_use]
    pub fn discrepancies(&self) -> &[Discrepancy] {
        &self.discrepancies
    }
}
