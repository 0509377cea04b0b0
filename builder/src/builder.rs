//! The two-phase build: a cacheable dependency layer, then the project.
//!
//! Nothing is written before the lock has been verified. All work happens in
//! a staging directory next to the target environment, which replaces the
//! previous environment only after both phases and the marker succeeded.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use strata_lock::{InstallPlan, LockFile, ProjectDescriptor, verify_lock};
use strata_types::{BuildSettings, CachePolicy, Digest, PackageName, ProjectPaths, Version};
use strata_utils::{PathFilter, copy_tree, tree_digest};

use crate::cache::LayerCache;
use crate::error::BuildError;
use crate::install::install_package;
use crate::layout::EnvironmentLayout;
use crate::marker::{EnvironmentMarker, InstallScope, MarkerPackage};
use crate::project::install_project;
use crate::source::{DirectoryIndex, PackageSource};

/// How the dependency layer was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheOutcome {
    Hit,
    Miss,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledSummary {
    pub name: PackageName,
    pub version: Version,
}

/// Result of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub scope: InstallScope,
    pub environment: PathBuf,
    pub layer_key: Digest,
    pub cache: CacheOutcome,
    pub packages: Vec<InstalledSummary>,
    pub project: Option<InstalledSummary>,
    /// Tree digest of the finished environment.
    pub digest: Digest,
}

pub struct Builder<S = DirectoryIndex> {
    paths: ProjectPaths,
    settings: BuildSettings,
    source: S,
}

impl Builder<DirectoryIndex> {
    /// Builder reading artifacts from the configured local index.
    #[must_use]
    pub fn new(paths: ProjectPaths, settings: BuildSettings) -> Self {
        let source = DirectoryIndex::new(settings.index());
        Self {
            paths,
            settings,
            source,
        }
    }
}

impl<S: PackageSource> Builder<S> {
    pub fn with_source(paths: ProjectPaths, settings: BuildSettings, source: S) -> Self {
        Self {
            paths,
            settings,
            source,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// Load the descriptor and lock and check them under frozen semantics.
    pub fn verify(&self) -> Result<(ProjectDescriptor, InstallPlan), BuildError> {
        let descriptor = ProjectDescriptor::load(self.paths.manifest())?;
        let lock = LockFile::load(self.paths.lock())?;
        let plan = verify_lock(&descriptor, lock.as_ref(), self.paths.lock())?;
        tracing::debug!(
            project = %plan.project(),
            packages = plan.packages().len(),
            key = %plan.layer_key().short(),
            "Lock verified"
        );
        Ok((descriptor, plan))
    }

    /// Phase one only: an environment with the locked dependencies.
    pub fn install_dependencies(&self) -> Result<BuildReport, BuildError> {
        self.install(InstallScope::Dependencies)
    }

    /// Both phases: dependencies plus the project itself.
    pub fn install_project(&self) -> Result<BuildReport, BuildError> {
        self.install(InstallScope::Project)
    }

    pub fn build(&self) -> Result<BuildReport, BuildError> {
        self.install_project()
    }

    pub fn install(&self, scope: InstallScope) -> Result<BuildReport, BuildError> {
        let (descriptor, plan) = self.verify()?;

        let target = self.settings.environment();
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(BuildError::io("create directory", parent))?;
        let staging = tempfile::Builder::new()
            .prefix(".strata-staging-")
            .tempdir_in(parent)
            .map_err(BuildError::io("create staging directory in", parent))?;
        let layout = EnvironmentLayout::new(staging.path());

        let cache = self.dependency_layer(&plan, &layout)?;
        layout.create_dirs()?;

        let project = if scope.includes_project() {
            let installed = install_project(&layout, &descriptor, self.paths.root())?;
            Some(InstalledSummary {
                name: installed.name,
                version: installed.version,
            })
        } else {
            None
        };

        let packages: Vec<InstalledSummary> = plan
            .packages()
            .iter()
            .map(|p| InstalledSummary {
                name: p.name.clone(),
                version: p.version.clone(),
            })
            .collect();
        EnvironmentMarker::new(
            descriptor.name().clone(),
            descriptor.version().clone(),
            scope,
            plan.layer_key(),
            packages
                .iter()
                .map(|p| MarkerPackage {
                    name: p.name.clone(),
                    version: p.version.clone(),
                })
                .collect(),
        )
        .write(&layout)?;

        let digest = tree_digest(staging.path()).map_err(BuildError::io("hash", staging.path()))?;
        swap_into_place(staging.path(), target, parent)?;

        tracing::info!(
            environment = %target.display(),
            scope = ?scope,
            cache = ?cache,
            digest = %digest.short(),
            "Environment ready"
        );
        Ok(BuildReport {
            scope,
            environment: target.to_path_buf(),
            layer_key: plan.layer_key(),
            cache,
            packages,
            project,
            digest,
        })
    }

    fn install_dependencies_into(
        &self,
        plan: &InstallPlan,
        layout: &EnvironmentLayout,
    ) -> Result<(), BuildError> {
        layout.create_dirs()?;
        for package in plan.packages() {
            let artifact = self.source.fetch(package)?;
            install_package(layout, package, &artifact)?;
        }
        Ok(())
    }

    fn dependency_layer(
        &self,
        plan: &InstallPlan,
        layout: &EnvironmentLayout,
    ) -> Result<CacheOutcome, BuildError> {
        let cache_dir = match self.settings.cache() {
            CachePolicy::Disabled => {
                self.install_dependencies_into(plan, layout)?;
                return Ok(CacheOutcome::Disabled);
            }
            CachePolicy::Layers(dir) => dir,
        };

        let cache = LayerCache::new(cache_dir);
        let key = plan.layer_key();
        let (layer, outcome) = match cache.lookup(key) {
            Some(layer) => {
                tracing::info!(key = %key.short(), "Dependency layer cache hit");
                cache.touch(key);
                (layer, CacheOutcome::Hit)
            }
            None => {
                tracing::info!(key = %key.short(), packages = plan.packages().len(), "Dependency layer cache miss");
                let layer = cache.store(key, |dir| {
                    self.install_dependencies_into(plan, &EnvironmentLayout::new(dir))
                })?;
                (layer, CacheOutcome::Miss)
            }
        };
        copy_tree(&layer, layout.root(), &PathFilter::none())
            .map_err(BuildError::io("copy layer", &layer))?;
        Ok(outcome)
    }
}

/// Replace `target` with `staging`, restoring the previous environment if the
/// final rename fails.
fn swap_into_place(staging: &Path, target: &Path, parent: &Path) -> Result<(), BuildError> {
    if !target.exists() {
        return fs::rename(staging, target).map_err(BuildError::io("move environment to", target));
    }

    let retired = tempfile::Builder::new()
        .prefix(".strata-retired-")
        .tempdir_in(parent)
        .map_err(BuildError::io("create directory in", parent))?;
    let previous = retired.path().join("env");
    fs::rename(target, &previous).map_err(BuildError::io("move aside", target))?;
    if let Err(source) = fs::rename(staging, target) {
        restore_previous(retired, target);
        return Err(BuildError::Io {
            action: "move environment to",
            path: target.to_path_buf(),
            source,
        });
    }
    Ok(())
}

/// Move the retired environment back to `target`. If that fails too, the
/// retired directory is left on disk and its path returned.
fn restore_previous(retired: tempfile::TempDir, target: &Path) -> Option<PathBuf> {
    let previous = retired.path().join("env");
    let Err(err) = fs::rename(&previous, target) else {
        return None;
    };
    let kept = retired.keep().join("env");
    tracing::error!(
        path = %target.display(),
        kept = %kept.display(),
        "Failed to restore previous environment: {err}"
    );
    Some(kept)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use strata_types::{BuildSettings, CachePolicy, ProjectPaths};
    use strata_utils::tree_digest;

    use super::{Builder, CacheOutcome, restore_previous};
    use crate::error::BuildError;

    fn write_project(root: &Path, lock: &str) {
        fs::create_dir_all(root.join("app")).unwrap();
        fs::write(root.join("app/__init__.py"), "").unwrap();
        fs::write(
            root.join("pyproject.toml"),
            "[project]\nname = \"svc\"\nversion = \"0.1.0\"\ndependencies = [\"sniffio>=1.3\"]\n[tool.strata]\npackages = [\"app\"]\n",
        )
        .unwrap();
        fs::write(root.join("strata.lock"), lock).unwrap();
    }

    fn index_with_sniffio(root: &Path) -> String {
        let pkg = root.join("sniffio/1.3.1");
        fs::create_dir_all(pkg.join("sniffio")).unwrap();
        fs::write(pkg.join("sniffio/__init__.py"), "").unwrap();
        let hash = tree_digest(&pkg).unwrap();
        format!(
            "version = 1\n\n[[package]]\nname = \"sniffio\"\nversion = \"1.3.1\"\nhash = \"{hash}\"\n"
        )
    }

    fn builder(root: &Path, cache: CachePolicy) -> Builder {
        Builder::new(
            ProjectPaths::new(root, &root.join("pyproject.toml"), &root.join("strata.lock")),
            BuildSettings::new(root.join(".venv"), root.join("index"), cache),
        )
    }

    #[test]
    fn second_build_hits_the_layer_cache() {
        let dir = tempfile::tempdir().unwrap();
        let lock = index_with_sniffio(&dir.path().join("index"));
        write_project(dir.path(), &lock);
        let cache = CachePolicy::Layers(dir.path().join("cache"));

        let first = builder(dir.path(), cache.clone()).build().unwrap();
        assert_eq!(first.cache, CacheOutcome::Miss);
        fs::write(dir.path().join("app/__init__.py"), "changed = True\n").unwrap();
        let second = builder(dir.path(), cache).build().unwrap();

        assert_eq!(second.cache, CacheOutcome::Hit);
        assert_eq!(first.layer_key, second.layer_key);
        assert_ne!(first.digest, second.digest);
        let env = dir.path().join(".venv/lib/site-packages");
        assert_eq!(
            fs::read_to_string(env.join("app/__init__.py")).unwrap(),
            "changed = True\n"
        );
        assert!(env.join("sniffio/__init__.py").is_file());
    }

    #[test]
    fn dependencies_scope_skips_project() {
        let dir = tempfile::tempdir().unwrap();
        let lock = index_with_sniffio(&dir.path().join("index"));
        write_project(dir.path(), &lock);

        let report = builder(dir.path(), CachePolicy::Disabled)
            .install_dependencies()
            .unwrap();
        assert_eq!(report.cache, CacheOutcome::Disabled);
        assert!(report.project.is_none());
        let site = dir.path().join(".venv/lib/site-packages");
        assert!(site.join("sniffio/__init__.py").is_file());
        assert!(!site.join("app").exists());
    }

    #[test]
    fn lock_mismatch_leaves_existing_environment_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let lock = index_with_sniffio(&dir.path().join("index"));
        write_project(dir.path(), &lock);
        builder(dir.path(), CachePolicy::Disabled).build().unwrap();
        let before = tree_digest(&dir.path().join(".venv")).unwrap();

        fs::write(dir.path().join("strata.lock"), "version = 1\n").unwrap();
        let err = builder(dir.path(), CachePolicy::Disabled)
            .build()
            .unwrap_err();

        assert!(matches!(err, BuildError::LockMismatch(_)));
        assert_eq!(tree_digest(&dir.path().join(".venv")).unwrap(), before);
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".strata-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn failed_restore_keeps_the_previous_environment() {
        let dir = tempfile::tempdir().unwrap();
        let retired = tempfile::Builder::new()
            .prefix(".strata-retired-")
            .tempdir_in(dir.path())
            .unwrap();
        fs::create_dir_all(retired.path().join("env/bin")).unwrap();
        fs::write(retired.path().join("env/bin/uvicorn"), "x").unwrap();

        let unreachable = dir.path().join("missing-parent/.venv");
        let kept = restore_previous(retired, &unreachable).unwrap();
        assert!(kept.join("bin/uvicorn").is_file());
        assert!(kept.starts_with(dir.path()));
    }

    #[test]
    fn successful_restore_moves_the_environment_back() {
        let dir = tempfile::tempdir().unwrap();
        let retired = tempfile::tempdir_in(dir.path()).unwrap();
        fs::create_dir_all(retired.path().join("env")).unwrap();
        fs::write(retired.path().join("env/marker"), "x").unwrap();

        let target = dir.path().join(".venv");
        assert!(restore_previous(retired, &target).is_none());
        assert!(target.join("marker").is_file());
    }
}
