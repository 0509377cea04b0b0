use std::path::{Path, PathBuf};

use serde::Serialize;
use strata_types::Digest;
use strata_utils::{PathFilter, copy_tree, is_missing_or_empty_dir, tree_digest};

use crate::error::BuildError;
use crate::marker::EnvironmentMarker;

#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub destination: PathBuf,
    pub files: usize,
    pub digest: Digest,
}

/// Copy a finished environment into `dest` for the runtime stage.
///
/// Only environments carrying a marker may be exported, and `dest` must be
/// missing or empty. Build tooling is never part of an environment, so the
/// copy contains exactly what the launcher needs.
pub fn export_environment(env: &Path, dest: &Path) -> Result<ExportReport, BuildError> {
    let marker = EnvironmentMarker::read(env)?;
    let empty = is_missing_or_empty_dir(dest).map_err(BuildError::io("read", dest))?;
    if !empty {
        return Err(BuildError::DestinationNotEmpty {
            path: dest.to_path_buf(),
        });
    }

    let files = copy_tree(env, dest, &PathFilter::none()).map_err(BuildError::io("copy", env))?;
    let digest = tree_digest(dest).map_err(BuildError::io("hash", dest))?;
    tracing::info!(
        project = %marker.project,
        destination = %dest.display(),
        files = files.len(),
        digest = %digest.short(),
        "Exported environment"
    );
    Ok(ExportReport {
        destination: dest.to_path_buf(),
        files: files.len(),
        digest,
    })
}
