//! Where locked artifacts come from.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use strata_lock::LockedPackage;
use strata_types::Version;

use crate::error::BuildError;

/// An unpacked package tree ready to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub root: PathBuf,
}

/// Resolves a locked package to its artifact. No network access is assumed;
/// implementations must be deterministic for a given lock entry.
pub trait PackageSource {
    fn fetch(&self, package: &LockedPackage) -> Result<Artifact, BuildError>;
}

/// Local index laid out as `<root>/<normalized-name>/<version>/`.
#[derive(Debug, Clone)]
pub struct DirectoryIndex {
    root: PathBuf,
}

impl DirectoryIndex {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A version directory spelled differently from the lock (`2.0` vs `2`)
    /// still matches when the versions compare equal.
    fn find_version_dir(name_dir: &Path, wanted: &Version) -> io::Result<Option<PathBuf>> {
        let exact = name_dir.join(wanted.to_string());
        if exact.is_dir() {
            return Ok(Some(exact));
        }
        let entries = match fs::read_dir(name_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        let mut matches = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if file_name.parse::<Version>().is_ok_and(|v| &v == wanted) {
                matches.push(entry.path());
            }
        }
        matches.sort();
        Ok(matches.into_iter().next())
    }
}

impl PackageSource for DirectoryIndex {
    fn fetch(&self, package: &LockedPackage) -> Result<Artifact, BuildError> {
        let name_dir = self.root.join(package.name.as_str());
        let found = Self::find_version_dir(&name_dir, &package.version)
            .map_err(BuildError::io("read package index", &name_dir))?;
        match found {
            Some(root) => {
                tracing::debug!(package = %package.name, version = %package.version, path = %root.display(), "Found artifact");
                Ok(Artifact { root })
            }
            None => Err(BuildError::PackageNotFound {
                name: package.name.clone(),
                version: package.version.clone(),
                index: self.root.clone(),
            }),
        }
    }
}
