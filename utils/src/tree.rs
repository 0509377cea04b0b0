//! Deterministic directory walking, hashing and copying.
//!
//! Every function here visits files in byte order of their `/`-separated
//! relative path, so two trees with the same contents always produce the same
//! digest and the same copy order. Symlinks are refused: installed trees must
//! be self-contained.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use sha2::{Digest as _, Sha256};
use strata_types::Digest;

const TREE_DIGEST_DOMAIN: &[u8] = b"strata-tree-v1\0";

/// One regular file inside a walked tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the walk root, always `/`-separated.
    pub relative: String,
    pub path: PathBuf,
    pub executable: bool,
}

/// Glob-based exclusion applied to relative paths.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    excludes: Option<GlobSet>,
}

impl PathFilter {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_patterns(patterns: &[String]) -> Result<Self, globset::Error> {
        if patterns.is_empty() {
            return Ok(Self::none());
        }
        let mut builder = GlobSetBuilder::new();
        for pat in patterns {
            builder.add(GlobBuilder::new(pat).literal_separator(true).build()?);
        }
        Ok(Self {
            excludes: Some(builder.build()?),
        })
    }

    #[must_use]
    pub fn is_excluded(&self, relative: &str) -> bool {
        self.excludes
            .as_ref()
            .is_some_and(|set| set.is_match(relative))
    }
}

fn walk_error(err: ignore::Error) -> io::Error {
    let message = err.to_string();
    err.into_io_error()
        .unwrap_or_else(|| io::Error::other(message))
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}

/// Set 0o755 / 0o644 so installed files do not depend on the source's umask.
pub fn set_normalized_mode(path: &Path, executable: bool) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if executable { 0o755 } else { 0o644 };
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, executable);
    }
    Ok(())
}

/// List every regular file under `root`, sorted by relative path.
pub fn walk_files(root: &Path, filter: &PathFilter) -> io::Result<Vec<TreeEntry>> {
    let mut builder = WalkBuilder::new(root);
    builder.standard_filters(false).follow_links(false);

    let mut entries = Vec::new();
    for entry in builder.build() {
        let entry = entry.map_err(walk_error)?;
        if entry.depth() == 0 {
            continue;
        }
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        if file_type.is_symlink() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("symlinks are not supported: {}", path.display()),
            ));
        }
        if !file_type.is_file() {
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .map_err(|_| io::Error::other(format!("{} escapes walk root", path.display())))?
            .to_string_lossy()
            .replace('\\', "/");
        if filter.is_excluded(&relative) {
            continue;
        }
        let meta = entry.metadata().map_err(walk_error)?;
        entries.push(TreeEntry {
            relative,
            path: path.to_path_buf(),
            executable: is_executable(&meta),
        });
    }

    entries.sort_by(|a, b| a.relative.as_bytes().cmp(b.relative.as_bytes()));
    Ok(entries)
}

/// SHA-256 of one file's contents.
pub fn hash_file(path: &Path) -> io::Result<Digest> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(Digest::from_bytes(hasher.finalize().into()))
}

/// Digest of a whole tree: relative paths, executable bits and contents.
///
/// Timestamps, owners and directory entries do not participate. Every field
/// is length-prefixed so no two distinct trees share an encoding.
pub fn tree_digest(root: &Path) -> io::Result<Digest> {
    tree_digest_filtered(root, &PathFilter::none())
}

pub fn tree_digest_filtered(root: &Path, filter: &PathFilter) -> io::Result<Digest> {
    let mut hasher = Sha256::new();
    hasher.update(TREE_DIGEST_DOMAIN);
    for entry in walk_files(root, filter)? {
        hasher.update((entry.relative.len() as u64).to_le_bytes());
        hasher.update(entry.relative.as_bytes());
        hasher.update([u8::from(entry.executable)]);

        let mut file = File::open(&entry.path)?;
        let len = file.metadata()?.len();
        hasher.update(len.to_le_bytes());
        let copied = io::copy(&mut file, &mut hasher)?;
        if copied != len {
            return Err(io::Error::other(format!(
                "{} changed while hashing",
                entry.path.display()
            )));
        }
    }
    hasher.flush()?;
    Ok(Digest::from_bytes(hasher.finalize().into()))
}

/// Copy every file under `src` into `dst`, creating directories as needed.
///
/// Returns the relative paths written, in copy order.
pub fn copy_tree(src: &Path, dst: &Path, filter: &PathFilter) -> io::Result<Vec<String>> {
    let entries = walk_files(src, filter)?;
    fs::create_dir_all(dst)?;
    let mut written = Vec::with_capacity(entries.len());
    for entry in entries {
        let target = dst.join(&entry.relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&entry.path, &target)?;
        set_normalized_mode(&target, entry.executable)?;
        written.push(entry.relative);
    }
    Ok(written)
}

pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// True when `path` is missing or an empty directory.
pub fn is_missing_or_empty_dir(path: &Path) -> io::Result<bool> {
    match fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(err) => Err(err),
    }
}
