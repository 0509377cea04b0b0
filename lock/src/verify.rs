//! Frozen verification: does the lock exactly reproduce the descriptor?
//!
//! There is no re-resolution. Any discrepancy refuses the install.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use strata_types::{Digest, PackageName};

use crate::descriptor::ProjectDescriptor;
use crate::error::{Discrepancy, LockMismatch};
use crate::key::layer_key;
use crate::lockfile::{LOCK_VERSION, LockFile, LockedPackage};

/// What a verified lock allows the builder to install.
#[derive(Debug, Clone)]
pub struct InstallPlan {
    project: PackageName,
    packages: Vec<LockedPackage>,
    layer_key: Digest,
}

impl InstallPlan {
    #[must_use]
    pub fn project(&self) -> &PackageName {
        &self.project
    }

    /// The full dependency closure, sorted by name.
    #[must_use]
    pub fn packages(&self) -> &[LockedPackage] {
        &self.packages
    }

    /// Cache key of the dependency layer this plan produces.
    #[must_use]
    pub fn layer_key(&self) -> Digest {
        self.layer_key
    }
}

/// Check `lock` against `descriptor` and return the install plan.
///
/// `lock_path` is only used when the lock is absent.
pub fn verify_lock(
    descriptor: &ProjectDescriptor,
    lock: Option<&LockFile>,
    lock_path: &std::path::Path,
) -> Result<InstallPlan, LockMismatch> {
    let Some(lock) = lock else {
        return Err(LockMismatch::new(lock_path, vec![Discrepancy::MissingLock]));
    };

    let mut problems = Vec::new();
    if lock.version() != LOCK_VERSION {
        problems.push(Discrepancy::UnsupportedVersion {
            found: lock.version(),
        });
    }

    let mut by_name: BTreeMap<&PackageName, &LockedPackage> = BTreeMap::new();
    let mut duplicates = BTreeSet::new();
    for package in lock.packages() {
        if by_name.insert(&package.name, package).is_some() {
            duplicates.insert(package.name.clone());
        }
    }
    problems.extend(
        duplicates
            .into_iter()
            .map(|name| Discrepancy::Duplicate { name }),
    );

    if by_name.contains_key(descriptor.name()) {
        problems.push(Discrepancy::SelfDependency {
            name: descriptor.name().clone(),
        });
    }

    if let Some(recorded) = lock.manifest_requirements() {
        let recorded: BTreeSet<String> = recorded.iter().map(ToString::to_string).collect();
        let declared: BTreeSet<String> = descriptor
            .dependencies()
            .iter()
            .map(ToString::to_string)
            .collect();
        if recorded != declared {
            problems.push(Discrepancy::Stale {
                added: declared.difference(&recorded).cloned().collect(),
                removed: recorded.difference(&declared).cloned().collect(),
            });
        }
    }

    for requirement in descriptor.dependencies() {
        match by_name.get(requirement.name()) {
            None => problems.push(Discrepancy::Unlocked {
                requirement: requirement.clone(),
            }),
            Some(locked) if !requirement.specifiers().contains(&locked.version) => {
                problems.push(Discrepancy::Unsatisfied {
                    requirement: requirement.clone(),
                    locked: locked.version.clone(),
                });
            }
            Some(_) => {}
        }
    }

    for package in by_name.values() {
        for dependency in &package.dependencies {
            if !by_name.contains_key(dependency) {
                problems.push(Discrepancy::UnlockedTransitive {
                    package: package.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    let reachable = reachable_from_roots(descriptor, &by_name);
    for (name, package) in &by_name {
        if !reachable.contains(*name) {
            problems.push(Discrepancy::Extraneous {
                name: (*name).clone(),
                version: package.version.clone(),
            });
        }
    }

    if !problems.is_empty() {
        tracing::warn!(
            lock = %lock.path().display(),
            problems = problems.len(),
            "Lock file does not satisfy the manifest"
        );
        return Err(LockMismatch::new(lock.path(), problems));
    }

    let packages: Vec<LockedPackage> = by_name.into_values().cloned().collect();
    tracing::debug!(packages = packages.len(), "Lock file verified");
    Ok(InstallPlan {
        project: descriptor.name().clone(),
        packages,
        layer_key: layer_key(descriptor, lock),
    })
}

fn reachable_from_roots<'a>(
    descriptor: &ProjectDescriptor,
    by_name: &BTreeMap<&'a PackageName, &'a LockedPackage>,
) -> BTreeSet<&'a PackageName> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<&'a PackageName> = VecDeque::new();
    for requirement in descriptor.dependencies() {
        if let Some((&name, _)) = by_name.get_key_value(requirement.name()) {
            queue.push_back(name);
        }
    }
    while let Some(name) = queue.pop_front() {
        let Some((&key, package)) = by_name.get_key_value(name) else {
            continue;
        };
        if !seen.insert(key) {
            continue;
        }
        for dependency in &package.dependencies {
            if let Some((&dep_key, _)) = by_name.get_key_value(dependency) {
                queue.push_back(dep_key);
            }
        }
    }
    seen
}
