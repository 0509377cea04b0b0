//! Frozen installs: an inconsistent lock never produces an environment.

use std::fs;

use strata_builder::{BuildError, LayerCache};
use strata_lock::Discrepancy;
use strata_utils::tree_digest;

use crate::common::Project;

fn discrepancies(err: BuildError) -> Vec<Discrepancy> {
    match err {
        BuildError::LockMismatch(mismatch) => mismatch.discrepancies().to_vec(),
        other => panic!("expected a lock mismatch, got {other}"),
    }
}

#[test]
fn missing_lock_builds_nothing() {
    let (project, _) = Project::standard();
    fs::remove_file(project.lock_path()).unwrap();

    let err = project.builder().build().unwrap_err();
    assert_eq!(discrepancies(err), vec![Discrepancy::MissingLock]);
    assert!(!project.environment().exists());
    assert!(!project.cache_dir().exists());
}

#[test]
fn new_requirement_without_relock_is_rejected() {
    let (project, packages) = Project::standard();
    project.write_pyproject(&["starlette>=0.27", "uvicorn>=0.29", "httpx>=0.27"]);
    project.write_lock(&packages, Some(&["starlette>=0.27", "uvicorn>=0.29"]));

    let found = discrepancies(project.builder().build().unwrap_err());
    assert!(found.iter().any(|d| matches!(d, Discrepancy::Stale { added, .. } if added == &["httpx>=0.27"])));
    assert!(found.iter().any(|d| matches!(d, Discrepancy::Unlocked { .. })));
    assert!(!project.environment().exists());
}

#[test]
fn tightened_specifier_is_unsatisfied() {
    let (project, packages) = Project::standard();
    project.write_pyproject(&["starlette>=0.38", "uvicorn>=0.29"]);
    project.write_lock(&packages, None);

    let found = discrepancies(project.builder().build().unwrap_err());
    assert!(matches!(
        found.as_slice(),
        [Discrepancy::Unsatisfied { locked, .. }] if locked.to_string() == "0.37.2"
    ));
}

#[test]
fn mismatch_keeps_previous_environment() {
    let (project, packages) = Project::standard();
    project.builder().build().unwrap();
    let before = tree_digest(&project.environment()).unwrap();

    project.write_lock(&packages[1..], None);
    let found = discrepancies(project.builder().build().unwrap_err());
    assert!(!found.is_empty());
    assert_eq!(tree_digest(&project.environment()).unwrap(), before);
}

#[test]
fn tampered_artifact_fails_without_publishing_a_layer() {
    let (project, _) = Project::standard();
    fs::write(
        project.index_dir().join("anyio/4.3.0/anyio/__init__.py"),
        "import os\nos.system('curl evil')\n",
    )
    .unwrap();

    let err = project.builder().build().unwrap_err();
    assert!(matches!(err, BuildError::HashMismatch { ref name, .. } if name.as_str() == "anyio"));
    assert!(!project.environment().exists());
    assert!(LayerCache::new(&project.cache_dir()).layers().unwrap().is_empty());
}

#[test]
fn missing_artifact_is_reported() {
    let (project, _) = Project::standard();
    fs::remove_dir_all(project.index_dir().join("sniffio")).unwrap();

    let err = project.builder().build().unwrap_err();
    assert!(matches!(err, BuildError::PackageNotFound { ref name, .. } if name.as_str() == "sniffio"));
}
