//! `strata.lock`: the pinned resolution of a project's dependencies.
//!
//! ```toml
//! version = 1
//!
//! [manifest]
//! dependencies = ["fastapi>=0.110"]
//!
//! [[package]]
//! name = "fastapi"
//! version = "0.110.0"
//! hash = "sha256:..."
//! dependencies = ["starlette", "pydantic"]
//! ```
//!
//! The lock is only ever read. Nothing in strata rewrites it.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use strata_types::{Digest, PackageName, Requirement, Version};

use crate::error::ManifestError;

pub const LOCK_VERSION: u32 = 1;

#[derive(Deserialize)]
struct RawLock {
    version: u32,
    manifest: Option<RawLockManifest>,
    #[serde(default)]
    package: Vec<LockedPackage>,
}

#[derive(Deserialize)]
struct RawLockManifest {
    #[serde(default)]
    dependencies: Vec<Requirement>,
}

/// One pinned distribution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LockedPackage {
    pub name: PackageName,
    pub version: Version,
    /// Tree digest of the package artifact.
    pub hash: Digest,
    #[serde(default)]
    pub dependencies: Vec<PackageName>,
}

#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
    version: u32,
    manifest_requirements: Option<Vec<Requirement>>,
    packages: Vec<LockedPackage>,
    bytes: Vec<u8>,
}

impl LockFile {
    /// Read and parse the lock file. `Ok(None)` when it does not exist, so the
    /// caller can report a missing lock as a frozen-install failure.
    pub fn load(path: &Path) -> Result<Option<Self>, ManifestError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                tracing::warn!("Failed to read lock file at {:?}: {}", path, source);
                return Err(ManifestError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_bytes(bytes, path).map(Some)
    }

    pub fn from_bytes(bytes: Vec<u8>, path: &Path) -> Result<Self, ManifestError> {
        let text = std::str::from_utf8(&bytes).map_err(|e| ManifestError::Invalid {
            path: path.to_path_buf(),
            field: "encoding",
            message: e.to_string(),
        })?;
        let raw: RawLock = toml::from_str(text).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            version: raw.version,
            manifest_requirements: raw.manifest.map(|m| m.dependencies),
            packages: raw.package,
            bytes,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Requirements the lock was resolved from, when recorded.
    #[must_use]
    pub fn manifest_requirements(&self) -> Option<&[Requirement]> {
        self.manifest_requirements.as_deref()
    }

    #[must_use]
    pub fn packages(&self) -> &[LockedPackage] {
        &self.packages
    }

    /// Exact file contents, used for the layer cache key.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
