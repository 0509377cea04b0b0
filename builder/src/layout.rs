//! On-disk layout of a runtime environment.

use std::fs;
use std::path::{Path, PathBuf};

use strata_types::{PackageName, Version};

use crate::error::BuildError;
use crate::marker::MARKER_FILE;

pub const BIN_DIR: &str = "bin";
pub const SITE_PACKAGES: &str = "lib/site-packages";

/// `<root>/bin`, `<root>/lib/site-packages`, `<root>/strata-env.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentLayout {
    root: PathBuf,
}

impl EnvironmentLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Executables; prepended to `PATH` at launch.
    #[must_use]
    pub fn bin(&self) -> PathBuf {
        self.root.join(BIN_DIR)
    }

    #[must_use]
    pub fn site_packages(&self) -> PathBuf {
        self.root.join(SITE_PACKAGES)
    }

    #[must_use]
    pub fn marker(&self) -> PathBuf {
        self.root.join(MARKER_FILE)
    }

    #[must_use]
    pub fn dist_info_name(name: &PackageName, version: &Version) -> String {
        format!("{}-{version}.dist-info", name.as_dist_info_name())
    }

    #[must_use]
    pub fn dist_info(&self, name: &PackageName, version: &Version) -> PathBuf {
        self.site_packages().join(Self::dist_info_name(name, version))
    }

    pub fn create_dirs(&self) -> Result<(), BuildError> {
        for dir in [self.bin(), self.site_packages()] {
            fs::create_dir_all(&dir).map_err(BuildError::io("create directory", &dir))?;
        }
        Ok(())
    }

    /// Whether the directory carries a marker, i.e. was produced by a build.
    #[must_use]
    pub fn is_environment(&self) -> bool {
        self.marker().is_file()
    }
}
