//! Phase two: the project's own packages and console scripts.

use std::path::{Path, PathBuf};

use strata_lock::ProjectDescriptor;
use strata_types::AppReference;
use strata_utils::{PathFilter, PersistMode};

use crate::error::BuildError;
use crate::install::{DistMetadata, InstalledPackage, Placement};
use crate::layout::{BIN_DIR, EnvironmentLayout, SITE_PACKAGES};

enum PackageRoot {
    Directory(PathBuf),
    Module(PathBuf),
}

/// `pkg` may live at the project root or under `src/`, as a directory or a
/// single `.py` module.
fn locate(project_root: &Path, package: &str) -> Option<(PackageRoot, String)> {
    let relative = package.replace('.', "/");
    for base in [project_root.to_path_buf(), project_root.join("src")] {
        let dir = base.join(&relative);
        if dir.is_dir() {
            return Some((PackageRoot::Directory(dir), relative));
        }
        let module = base.join(format!("{relative}.py"));
        if module.is_file() {
            return Some((PackageRoot::Module(module), format!("{relative}.py")));
        }
    }
    None
}

fn console_script(entry: &AppReference) -> String {
    format!(
        "#!/usr/bin/env python3\nimport sys\nfrom {module} import {root}\n\nif __name__ == \"__main__\":\n    sys.exit({call}())\n",
        module = entry.module_path(),
        root = entry.root_attribute(),
        call = entry.attribute_path(),
    )
}

/// Install the project into `layout`, which already holds the dependency
/// layer. Excluded paths never reach the environment.
pub fn install_project(
    layout: &EnvironmentLayout,
    descriptor: &ProjectDescriptor,
    project_root: &Path,
) -> Result<InstalledPackage, BuildError> {
    let filter = PathFilter::from_patterns(descriptor.exclude()).map_err(|err| {
        BuildError::ExcludePattern {
            message: err.to_string(),
        }
    })?;

    let mut placement = Placement::new(layout, descriptor.name());
    for package in descriptor.packages() {
        let Some((root, relative)) = locate(project_root, package) else {
            return Err(BuildError::ProjectPackageMissing {
                package: package.clone(),
                root: project_root.to_path_buf(),
            });
        };
        match root {
            PackageRoot::Directory(dir) => {
                let entries = strata_utils::walk_files(&dir, &PathFilter::none())
                    .map_err(BuildError::io("walk", &dir))?;
                for entry in entries {
                    let package_relative = format!("{relative}/{}", entry.relative);
                    if filter.is_excluded(&package_relative) {
                        tracing::trace!(path = %package_relative, "Excluded from project layer");
                        continue;
                    }
                    placement.copy_file(
                        &entry.path,
                        format!("{SITE_PACKAGES}/{package_relative}"),
                        false,
                    )?;
                }
            }
            PackageRoot::Module(file) => {
                if !filter.is_excluded(&relative) {
                    placement.copy_file(&file, format!("{SITE_PACKAGES}/{relative}"), false)?;
                }
            }
        }
    }

    for (script, entry) in descriptor.scripts() {
        placement.write_file(
            format!("{BIN_DIR}/{script}"),
            console_script(entry).as_bytes(),
            PersistMode::Executable,
        )?;
    }

    let installed = placement.finish(&DistMetadata {
        name: descriptor.name(),
        version: descriptor.version(),
        requires_dist: descriptor
            .dependencies()
            .iter()
            .map(ToString::to_string)
            .collect(),
        requires_python: descriptor.requires_python().map(ToString::to_string),
    })?;
    tracing::info!(
        project = %installed.name,
        version = %installed.version,
        files = installed.files.len(),
        "Installed project layer"
    );
    Ok(installed)
}
