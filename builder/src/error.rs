use std::io;
use std::path::PathBuf;

use strata_lock::{LockMismatch, ManifestError};
use strata_types::{Digest, PackageName, Version};
use thiserror::Error;

use crate::marker::MARKER_FILE;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    LockMismatch(#[from] LockMismatch),
    #[error("{name}=={version} not found in package index {}", index.display())]
    PackageNotFound {
        name: PackageName,
        version: Version,
        index: PathBuf,
    },
    #[error("hash mismatch for {name}=={version}: lock pins {expected}, artifact is {actual}")]
    HashMismatch {
        name: PackageName,
        version: Version,
        expected: Digest,
        actual: Digest,
    },
    #[error("{owner} would overwrite an already installed file: {path}")]
    FileConflict { owner: PackageName, path: String },
    #[error("project package '{package}' not found under {}", root.display())]
    ProjectPackageMissing { package: String, root: PathBuf },
    #[error("invalid exclude pattern: {message}")]
    ExcludePattern { message: String },
    #[error("{} is not a strata environment (no {MARKER_FILE})", path.display())]
    NotAnEnvironment { path: PathBuf },
    #[error("invalid environment marker {}: {message}", path.display())]
    BadMarker { path: PathBuf, message: String },
    #[error("export destination {} is not empty", path.display())]
    DestinationNotEmpty { path: PathBuf },
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BuildError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| BuildError::Io {
            action,
            path,
            source,
        }
    }
}
