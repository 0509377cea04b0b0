//! The `strata` binary: subcommands and exit codes.

use std::fs;
use std::net::TcpListener;
use std::process::Stdio;
use std::time::{Duration, Instant};

use crate::common::{Project, free_port, python3_available, strata};

#[test]
fn build_then_export_prints_matching_digests() {
    let (project, _) = Project::standard();
    let build = strata(&project).args(["build", "--json"]).output().unwrap();
    assert!(build.status.success(), "{}", String::from_utf8_lossy(&build.stderr));
    let report: serde_json::Value = serde_json::from_slice(&build.stdout).unwrap();
    assert_eq!(report["cache"], "miss");
    assert_eq!(report["scope"], "project");

    let dest = project.base().join("runtime");
    let export = strata(&project)
        .arg("export")
        .arg(&dest)
        .output()
        .unwrap();
    assert!(export.status.success());
    assert_eq!(
        String::from_utf8_lossy(&export.stdout).trim(),
        report["digest"].as_str().unwrap()
    );

    let digest = strata(&project).arg("digest").arg(&dest).output().unwrap();
    assert_eq!(digest.stdout, export.stdout);
}

#[test]
fn verify_reports_lock_mismatch_with_exit_code_3() {
    let (project, packages) = Project::standard();
    project.write_lock(&packages[..2], None);

    let out = strata(&project).args(["verify", "--json"]).output().unwrap();
    assert_eq!(out.status.code(), Some(3));
    let body: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(body["ok"], false);
    assert!(!body["discrepancies"].as_array().unwrap().is_empty());

    let out = strata(&project).arg("install-deps").output().unwrap();
    assert_eq!(out.status.code(), Some(3));
    assert!(!project.environment().exists());
}

#[test]
fn serve_with_unknown_attribute_exits_4() {
    let (project, _) = Project::standard();
    assert!(strata(&project).arg("build").status().unwrap().success());

    let out = strata(&project)
        .args(["serve", "--host", "127.0.0.1", "--app", "app.main:nope"])
        .arg("--port")
        .arg(free_port().to_string())
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&out.stderr).contains("app.main:nope"));
}

#[test]
fn serve_on_occupied_port_exits_5() {
    let (project, _) = Project::standard();
    assert!(strata(&project).arg("build").status().unwrap().success());
    let held = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = held.local_addr().unwrap().port();

    let out = strata(&project)
        .args(["serve", "--host", "127.0.0.1", "--port", &port.to_string()])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(5));
}

#[test]
fn bad_usage_exits_2() {
    let (project, _) = Project::standard();
    let out = strata(&project).args(["serve", "--port", "0x50"]).output().unwrap();
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn prune_respects_no_cache_config() {
    let (project, _) = Project::standard();
    fs::write(project.root().join("strata.toml"), "[build]\nno_cache = true\n").unwrap();
    let out = strata(&project).arg("prune").output().unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("disabled"));
}

#[cfg(unix)]
#[test]
fn sigterm_stops_serving_with_exit_0() {
    if !python3_available() {
        eprintln!("python3 not available; skipping");
        return;
    }
    let (project, _) = Project::standard();
    assert!(strata(&project).arg("build").status().unwrap().success());
    let port = free_port();

    let mut child = strata(&project)
        .args(["serve", "--host", "127.0.0.1", "--port", &port.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(15);
    while std::net::TcpStream::connect(("127.0.0.1", port)).is_err() {
        assert!(Instant::now() < deadline, "server never became ready");
        std::thread::sleep(Duration::from_millis(50));
    }
    // Give the launcher a moment to move from readiness to serving.
    std::thread::sleep(Duration::from_millis(200));

    let killed = std::process::Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(killed.success());
    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(0));
    assert!(std::net::TcpStream::connect(("127.0.0.1", port)).is_err());
}
