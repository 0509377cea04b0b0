//! Placing package files into an environment and writing `.dist-info`.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use strata_lock::LockedPackage;
use strata_types::{Digest, PackageName, Version};
use strata_utils::{
    AtomicWriteOptions, FileSyncPolicy, PathFilter, PersistMode, atomic_write_with_options,
    hash_file, set_normalized_mode, tree_digest, walk_files,
};

use crate::error::BuildError;
use crate::layout::{BIN_DIR, EnvironmentLayout};
use crate::source::Artifact;

pub(crate) const INSTALLER: &str = "strata";

/// What one install step put into the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: PackageName,
    pub version: Version,
    /// Environment-relative paths, `dist-info` included.
    pub files: Vec<String>,
}

/// One RECORD row; `path` is relative to site-packages.
#[derive(Debug, Clone)]
pub(crate) struct RecordEntry {
    path: String,
    hash: Digest,
    size: u64,
}

/// Metadata written into `<name>-<version>.dist-info/METADATA`.
pub(crate) struct DistMetadata<'a> {
    pub name: &'a PackageName,
    pub version: &'a Version,
    pub requires_dist: Vec<String>,
    pub requires_python: Option<String>,
}

/// Accumulates files for one distribution.
pub(crate) struct Placement<'a> {
    layout: &'a EnvironmentLayout,
    owner: &'a PackageName,
    record: Vec<RecordEntry>,
    files: Vec<String>,
}

fn write_options(mode: PersistMode) -> AtomicWriteOptions {
    AtomicWriteOptions {
        file_sync: FileSyncPolicy::SkipSync,
        mode,
    }
}

impl<'a> Placement<'a> {
    pub(crate) fn new(layout: &'a EnvironmentLayout, owner: &'a PackageName) -> Self {
        Self {
            layout,
            owner,
            record: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Map an artifact-relative path to its environment-relative destination:
    /// `bin/*` stays in `bin/`, everything else lands in site-packages.
    fn destination(relative: &str) -> String {
        if relative.starts_with("bin/") {
            relative.to_string()
        } else {
            format!("{}/{relative}", crate::layout::SITE_PACKAGES)
        }
    }

    fn record_path(env_relative: &str) -> String {
        match env_relative.strip_prefix(&format!("{}/", crate::layout::SITE_PACKAGES)) {
            Some(rest) => rest.to_string(),
            None => format!("../../{env_relative}"),
        }
    }

    fn claim(&self, env_relative: &str) -> Result<PathBuf, BuildError> {
        let target = self.layout.root().join(env_relative);
        if target.exists() {
            return Err(BuildError::FileConflict {
                owner: self.owner.clone(),
                path: env_relative.to_string(),
            });
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(BuildError::io("create directory", parent))?;
        }
        Ok(target)
    }

    fn note(&mut self, env_relative: String, target: &Path) -> Result<(), BuildError> {
        let hash = hash_file(target).map_err(BuildError::io("hash", target))?;
        let size = fs::metadata(target)
            .map_err(BuildError::io("stat", target))?
            .len();
        self.record.push(RecordEntry {
            path: Self::record_path(&env_relative),
            hash,
            size,
        });
        self.files.push(env_relative);
        Ok(())
    }

    /// Copy `source` to the environment-relative path `env_relative`.
    pub(crate) fn copy_file(
        &mut self,
        source: &Path,
        env_relative: String,
        executable: bool,
    ) -> Result<(), BuildError> {
        let target = self.claim(&env_relative)?;
        fs::copy(source, &target).map_err(BuildError::io("copy", source))?;
        set_normalized_mode(&target, executable).map_err(BuildError::io("chmod", &target))?;
        self.note(env_relative, &target)
    }

    /// Write generated contents (console scripts) to `env_relative`.
    pub(crate) fn write_file(
        &mut self,
        env_relative: String,
        contents: &[u8],
        mode: PersistMode,
    ) -> Result<(), BuildError> {
        let target = self.claim(&env_relative)?;
        atomic_write_with_options(&target, contents, write_options(mode))
            .map_err(BuildError::io("write", &target))?;
        self.note(env_relative, &target)
    }

    /// Copy an artifact tree, routing `bin/` entries to the environment's bin.
    pub(crate) fn copy_artifact(&mut self, root: &Path, filter: &PathFilter) -> Result<(), BuildError> {
        let entries = walk_files(root, filter).map_err(BuildError::io("walk", root))?;
        for entry in entries {
            let executable = entry.executable || entry.relative.starts_with(&format!("{BIN_DIR}/"));
            self.copy_file(&entry.path, Self::destination(&entry.relative), executable)?;
        }
        Ok(())
    }

    /// Write METADATA, INSTALLER and RECORD, consuming the placement.
    pub(crate) fn finish(mut self, metadata: &DistMetadata<'_>) -> Result<InstalledPackage, BuildError> {
        let dist_name = EnvironmentLayout::dist_info_name(metadata.name, metadata.version);
        let dist_rel = format!("{}/{dist_name}", crate::layout::SITE_PACKAGES);

        self.write_file(
            format!("{dist_rel}/METADATA"),
            render_metadata(metadata).as_bytes(),
            PersistMode::Regular,
        )?;
        self.write_file(
            format!("{dist_rel}/INSTALLER"),
            format!("{INSTALLER}\n").as_bytes(),
            PersistMode::Regular,
        )?;

        let record_rel = format!("{dist_rel}/RECORD");
        let record = render_record(&self.record, &format!("{dist_name}/RECORD"));
        let target = self.claim(&record_rel)?;
        atomic_write_with_options(&target, record.as_bytes(), write_options(PersistMode::Regular))
            .map_err(BuildError::io("write", &target))?;
        self.files.push(record_rel);
        self.files.sort();

        Ok(InstalledPackage {
            name: metadata.name.clone(),
            version: metadata.version.clone(),
            files: self.files,
        })
    }
}

fn render_metadata(metadata: &DistMetadata<'_>) -> String {
    let mut out = String::from("Metadata-Version: 2.1\n");
    let _ = writeln!(out, "Name: {}", metadata.name);
    let _ = writeln!(out, "Version: {}", metadata.version);
    if let Some(requires_python) = &metadata.requires_python {
        let _ = writeln!(out, "Requires-Python: {requires_python}");
    }
    for requirement in &metadata.requires_dist {
        let _ = writeln!(out, "Requires-Dist: {requirement}");
    }
    out
}

fn render_record(entries: &[RecordEntry], record_self: &str) -> String {
    let mut rows: Vec<String> = entries
        .iter()
        .map(|entry| {
            format!(
                "{},sha256={},{}",
                entry.path,
                URL_SAFE_NO_PAD.encode(entry.hash.as_bytes()),
                entry.size
            )
        })
        .collect();
    rows.push(format!("{record_self},,"));
    rows.sort();
    let mut out = rows.join("\n");
    out.push('\n');
    out
}

/// Install one locked dependency after checking its artifact against the
/// pinned hash.
pub fn install_package(
    layout: &EnvironmentLayout,
    package: &LockedPackage,
    artifact: &Artifact,
) -> Result<InstalledPackage, BuildError> {
    let actual = tree_digest(&artifact.root).map_err(BuildError::io("hash", &artifact.root))?;
    if actual != package.hash {
        return Err(BuildError::HashMismatch {
            name: package.name.clone(),
            version: package.version.clone(),
            expected: package.hash,
            actual,
        });
    }

    let mut placement = Placement::new(layout, &package.name);
    placement.copy_artifact(&artifact.root, &PathFilter::none())?;
    let installed = placement.finish(&DistMetadata {
        name: &package.name,
        version: &package.version,
        requires_dist: package.dependencies.iter().map(ToString::to_string).collect(),
        requires_python: None,
    })?;
    tracing::debug!(
        package = %installed.name,
        version = %installed.version,
        files = installed.files.len(),
        "Installed package"
    );
    Ok(installed)
}
