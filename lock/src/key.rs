//! Dependency layer cache key.

use sha2::{Digest as _, Sha256};
use strata_types::Digest;

use crate::descriptor::ProjectDescriptor;
use crate::lockfile::LockFile;

const LAYER_KEY_DOMAIN: &[u8] = b"strata-layer-v1\0";

/// Key of the dependency layer produced by `descriptor` + `lock`.
///
/// Covers the canonical, sorted dependency requirements and the exact lock
/// bytes. Project name, version and source do not participate, so editing
/// application code or bumping the project version reuses the cached layer.
#[must_use]
pub fn layer_key(descriptor: &ProjectDescriptor, lock: &LockFile) -> Digest {
    let mut requirements: Vec<String> = descriptor
        .dependencies()
        .iter()
        .map(ToString::to_string)
        .collect();
    requirements.sort();

    let mut hasher = Sha256::new();
    hasher.update(LAYER_KEY_DOMAIN);
    for requirement in &requirements {
        hasher.update(requirement.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"\0");
    hasher.update(lock.bytes());
    Digest::from_bytes(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::layer_key;
    use crate::descriptor::ProjectDescriptor;
    use crate::lockfile::LockFile;

    fn descriptor(version: &str, deps: &str) -> ProjectDescriptor {
        let text =
            format!("[project]\nname = \"svc\"\nversion = \"{version}\"\ndependencies = [{deps}]\n");
        ProjectDescriptor::parse(&text, Path::new("pyproject.toml")).unwrap()
    }

    fn lock(text: &str) -> LockFile {
        LockFile::from_bytes(text.as_bytes().to_vec(), Path::new("strata.lock")).unwrap()
    }

    #[test]
    fn project_version_does_not_change_key() {
        let lock = lock("version = 1\n");
        let a = layer_key(&descriptor("0.1.0", "\"x>=1\", \"y\""), &lock);
        let b = layer_key(&descriptor("0.2.0", "\"y\", \"X >= 1\""), &lock);
        assert_eq!(a, b);
    }

    #[test]
    fn requirements_and_lock_bytes_change_key() {
        let l1 = lock("version = 1\n");
        let l2 = lock("version = 1\n# touched\n");
        let base = layer_key(&descriptor("0.1.0", "\"x>=1\""), &l1);
        assert_ne!(base, layer_key(&descriptor("0.1.0", "\"x>=2\""), &l1));
        assert_ne!(base, layer_key(&descriptor("0.1.0", "\"x>=1\""), &l2));
    }
}
