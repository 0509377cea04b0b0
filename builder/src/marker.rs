//! `strata-env.toml`: proof that a directory is a finished environment.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_types::{Digest, PackageName, Version};
use strata_utils::atomic_write;

use crate::error::BuildError;
use crate::layout::EnvironmentLayout;

pub const MARKER_FILE: &str = "strata-env.toml";
const MARKER_FORMAT: u32 = 1;

/// Which part of the project an environment contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallScope {
    /// Locked dependencies only.
    Dependencies,
    /// Dependencies plus the project's own packages and scripts.
    Project,
}

impl InstallScope {
    #[must_use]
    pub fn includes_project(self) -> bool {
        matches!(self, Self::Project)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerPackage {
    pub name: PackageName,
    pub version: Version,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentMarker {
    pub format: u32,
    pub project: PackageName,
    pub project_version: Version,
    pub scope: InstallScope,
    pub layer_key: Digest,
    #[serde(default)]
    pub packages: Vec<MarkerPackage>,
}

impl EnvironmentMarker {
    #[must_use]
    pub fn new(
        project: PackageName,
        project_version: Version,
        scope: InstallScope,
        layer_key: Digest,
        packages: Vec<MarkerPackage>,
    ) -> Self {
        Self {
            format: MARKER_FORMAT,
            project,
            project_version,
            scope,
            layer_key,
            packages,
        }
    }

    pub fn write(&self, layout: &EnvironmentLayout) -> Result<(), BuildError> {
        let path = layout.marker();
        let text = toml::to_string(self).map_err(|err| BuildError::BadMarker {
            path: path.clone(),
            message: err.to_string(),
        })?;
        atomic_write(&path, text.as_bytes()).map_err(BuildError::io("write", &path))
    }

    /// Read the marker of the environment rooted at `root`.
    pub fn read(root: &Path) -> Result<Self, BuildError> {
        let path = EnvironmentLayout::new(root).marker();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(BuildError::NotAnEnvironment {
                    path: root.to_path_buf(),
                });
            }
            Err(source) => {
                return Err(BuildError::Io {
                    action: "read",
                    path,
                    source,
                });
            }
        };
        let marker: Self = toml::from_str(&text).map_err(|err| BuildError::BadMarker {
            path: path.clone(),
            message: err.to_string(),
        })?;
        if marker.format != MARKER_FORMAT {
            return Err(BuildError::BadMarker {
                path,
                message: format!("unsupported format {}", marker.format),
            });
        }
        Ok(marker)
    }
}
