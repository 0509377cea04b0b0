//! Two-phase builds, layer reuse and reproducibility.

use std::fs;

use strata_builder::{CacheOutcome, EnvironmentMarker, InstallScope, LayerCache, export_environment};
use strata_utils::tree_digest;

use crate::common::Project;

#[test]
fn build_lays_out_dependencies_project_and_scripts() {
    let (project, _) = Project::standard();
    let report = project.builder().build().unwrap();

    let env = project.environment();
    let site = env.join("lib/site-packages");
    for file in [
        "sniffio/__init__.py",
        "anyio/__init__.py",
        "starlette/applications.py",
        "uvicorn/__init__.py",
        "app/main.py",
        "starlette-0.37.2.dist-info/RECORD",
        "svc-0.1.0.dist-info/METADATA",
    ] {
        assert!(site.join(file).is_file(), "missing {file}");
    }
    assert!(env.join("bin/uvicorn").is_file());
    assert!(env.join("bin/svc-admin").is_file());
    assert!(!site.join("app/__pycache__").exists());

    let marker = EnvironmentMarker::read(&env).unwrap();
    assert_eq!(marker.scope, InstallScope::Project);
    assert_eq!(marker.packages.len(), 4);
    assert_eq!(report.digest, tree_digest(&env).unwrap());
    assert_eq!(report.cache, CacheOutcome::Miss);
}

#[test]
fn environment_holds_exactly_the_locked_closure_and_project() {
    let project = Project::new();
    let x = project.index_package("x", "1.0", &[("x/__init__.py", "")], &[]);
    project.index_package("stray", "2.0", &[("stray/__init__.py", "")], &[]);
    project.write_pyproject(&["x==1.0"]);
    project.write_lock(&[x], Some(&["x==1.0"]));
    project.write_app("app = Starlette()\n");

    project.builder().build().unwrap();

    let site = project.environment().join("lib/site-packages");
    let mut entries: Vec<String> = fs::read_dir(&site)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(entries, ["app", "svc-0.1.0.dist-info", "x", "x-1.0.dist-info"]);

    let marker = EnvironmentMarker::read(&project.environment()).unwrap();
    let locked: Vec<String> = marker
        .packages
        .iter()
        .map(|p| format!("{}=={}", p.name, p.version))
        .collect();
    assert_eq!(locked, ["x==1.0"]);
}

#[test]
fn build_never_rewrites_the_lock() {
    let (project, _) = Project::standard();
    let before = fs::read(project.lock_path()).unwrap();
    project.builder().build().unwrap();
    assert_eq!(fs::read(project.lock_path()).unwrap(), before);
}

#[test]
fn identical_inputs_give_identical_environments() {
    let (project, _) = Project::standard();
    let first = project.uncached_builder().build().unwrap();
    fs::rename(project.environment(), project.base().join("first")).unwrap();
    let second = project.uncached_builder().build().unwrap();

    assert_eq!(first.digest, second.digest);
    assert_eq!(
        tree_digest(&project.base().join("first")).unwrap(),
        tree_digest(&project.environment()).unwrap()
    );
}

#[test]
fn cached_and_uncached_layers_match() {
    let (project, _) = Project::standard();
    let uncached = project.uncached_builder().build().unwrap();
    project.builder().build().unwrap();
    let cached = project.builder().build().unwrap();

    assert_eq!(cached.cache, CacheOutcome::Hit);
    assert_eq!(cached.digest, uncached.digest);
}

#[test]
fn source_edit_reuses_dependency_layer() {
    let (project, _) = Project::standard();
    let first = project.builder().build().unwrap();

    project.write_app("app = Starlette()\nDEBUG = False\n");
    let second = project.builder().build().unwrap();

    assert_eq!(second.cache, CacheOutcome::Hit);
    assert_eq!(first.layer_key, second.layer_key);
    assert_ne!(first.digest, second.digest);
    let main = fs::read_to_string(project.environment().join("lib/site-packages/app/main.py")).unwrap();
    assert!(main.contains("DEBUG = False"));
}

#[test]
fn dependency_change_misses_the_cache() {
    let (project, mut packages) = Project::standard();
    let first = project.builder().build().unwrap();

    packages.push(project.index_package("h11", "0.14.0", &[("h11/__init__.py", "")], &[]));
    project.write_pyproject(&["starlette>=0.27", "uvicorn>=0.29", "h11>=0.14"]);
    project.write_lock(&packages, Some(&["starlette>=0.27", "uvicorn>=0.29", "h11>=0.14"]));
    let second = project.builder().build().unwrap();

    assert_eq!(second.cache, CacheOutcome::Miss);
    assert_ne!(first.layer_key, second.layer_key);
    assert!(project.environment().join("lib/site-packages/h11/__init__.py").is_file());
    assert_eq!(
        LayerCache::new(&project.cache_dir()).layers().unwrap().len(),
        2
    );
}

#[test]
fn dependencies_then_project() {
    let (project, _) = Project::standard();
    let deps = project.builder().install_dependencies().unwrap();
    assert!(deps.project.is_none());
    assert!(!project.environment().join("lib/site-packages/app").exists());

    let full = project.builder().install_project().unwrap();
    assert_eq!(full.cache, CacheOutcome::Hit);
    assert_eq!(full.project.unwrap().name.as_str(), "svc");
    assert!(project.environment().join("lib/site-packages/app/main.py").is_file());
}

#[test]
fn exported_environment_is_byte_identical() {
    let (project, _) = Project::standard();
    let report = project.builder().build().unwrap();
    let dest = project.base().join("runtime/venv");

    let export = export_environment(&project.environment(), &dest).unwrap();
    assert_eq!(export.digest, report.digest);
    assert!(!dest.join("packages").exists());
    assert!(!dest.join("pyproject.toml").exists());
}

#[test]
fn pruning_keeps_the_current_layer() {
    let (project, mut packages) = Project::standard();
    project.builder().build().unwrap();
    packages.push(project.index_package("h11", "0.14.0", &[("h11/__init__.py", "")], &[]));
    project.write_pyproject(&["starlette>=0.27", "uvicorn>=0.29", "h11>=0.14"]);
    project.write_lock(&packages, None);
    let current = project.builder().build().unwrap();

    let cache = LayerCache::new(&project.cache_dir());
    let removed = cache.prune(1).unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(cache.layers().unwrap(), vec![current.layer_key]);
}
