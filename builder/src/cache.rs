//! Content-addressed cache of dependency layers.
//!
//! A layer is the environment tree produced by installing every locked
//! dependency and nothing else, stored under `<cache>/layers/<key-hex>/`.
//! Layers are filled in a temporary sibling directory and renamed into place,
//! so a reader never sees a partial layer. Last use is tracked in a
//! `<key-hex>.used` sidecar file outside the layer so layer contents stay
//! byte-identical to a fresh install.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use strata_types::Digest;
use strata_utils::{atomic_write, remove_dir_if_exists};

use crate::error::BuildError;

const LAYERS_DIR: &str = "layers";
const USED_SUFFIX: &str = ".used";

#[derive(Debug, Clone)]
pub struct LayerCache {
    root: PathBuf,
}

impl LayerCache {
    #[must_use]
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            root: cache_dir.join(LAYERS_DIR),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn layer_path(&self, key: Digest) -> PathBuf {
        self.root.join(key.to_hex())
    }

    fn used_path(&self, hex: &str) -> PathBuf {
        self.root.join(format!("{hex}{USED_SUFFIX}"))
    }

    /// Path of a completed layer for `key`, if one exists.
    #[must_use]
    pub fn lookup(&self, key: Digest) -> Option<PathBuf> {
        let path = self.layer_path(key);
        path.is_dir().then_some(path)
    }

    /// Record that `key` was just used. Failures only affect pruning order.
    pub fn touch(&self, key: Digest) {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        let path = self.used_path(&key.to_hex());
        if let Err(err) = atomic_write(&path, format!("{nanos}\n").as_bytes()) {
            tracing::warn!(path = %path.display(), "Failed to record layer use: {err}");
        }
    }

    /// Fill a new layer for `key` with `fill` and publish it.
    ///
    /// If another build published the same key first, its layer is kept and
    /// ours is discarded; both are identical by construction.
    pub fn store<F>(&self, key: Digest, fill: F) -> Result<PathBuf, BuildError>
    where
        F: FnOnce(&Path) -> Result<(), BuildError>,
    {
        fs::create_dir_all(&self.root).map_err(BuildError::io("create directory", &self.root))?;
        let staging = tempfile::Builder::new()
            .prefix(".fill-")
            .tempdir_in(&self.root)
            .map_err(BuildError::io("create directory in", &self.root))?;
        fill(staging.path())?;

        let path = self.layer_path(key);
        match fs::rename(staging.path(), &path) {
            Ok(()) => {}
            Err(_) if path.is_dir() => {
                tracing::debug!(key = %key.short(), "Layer published concurrently; keeping existing");
            }
            Err(source) => {
                return Err(BuildError::Io {
                    action: "publish layer",
                    path,
                    source,
                });
            }
        }
        self.touch(key);
        Ok(path)
    }

    /// Keys of all completed layers, most recently used first.
    pub fn layers(&self) -> Result<Vec<Digest>, BuildError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(BuildError::Io {
                    action: "read",
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut layers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(BuildError::io("read", &self.root))?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Ok(key) = format!("sha256:{name}").parse::<Digest>() else {
                continue;
            };
            if !entry.path().is_dir() {
                continue;
            }
            layers.push((self.last_used(&name), key));
        }
        layers.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        Ok(layers.into_iter().map(|(_, key)| key).collect())
    }

    fn last_used(&self, hex: &str) -> u128 {
        fs::read_to_string(self.used_path(hex))
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Remove all but the `keep` most recently used layers. Returns the
    /// removed keys.
    pub fn prune(&self, keep: usize) -> Result<Vec<Digest>, BuildError> {
        let mut removed = Vec::new();
        for key in self.layers()?.into_iter().skip(keep) {
            let path = self.layer_path(key);
            remove_dir_if_exists(&path).map_err(BuildError::io("remove", &path))?;
            let used = self.used_path(&key.to_hex());
            if let Err(err) = fs::remove_file(&used)
                && err.kind() != io::ErrorKind::NotFound
            {
                tracing::warn!(path = %used.display(), "Failed to remove layer sidecar: {err}");
            }
            tracing::info!(key = %key.short(), "Pruned layer");
            removed.push(key);
        }
        Ok(removed)
    }
}
