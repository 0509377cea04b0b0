//! Launching a built environment with a stand-in ASGI server.

use std::fs;
use std::io::Read;
use std::net::TcpStream;
use std::time::Duration;

use strata_launcher::{LaunchConfig, LaunchError, Launcher, Lifecycle, ShutdownReason, Termination};
use strata_types::BindAddress;
use tokio::sync::oneshot;

use crate::common::{Project, free_port, python3_available};

fn launch_config(project: &Project, port: u16) -> LaunchConfig {
    let config = project.config();
    let mut launch = LaunchConfig::new(
        config.launch,
        project.root(),
        project.environment(),
    );
    launch.settings.bind = BindAddress::new("127.0.0.1".parse().unwrap(), port).unwrap();
    launch
}

fn fetch(port: u16) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut body = String::new();
    stream.read_to_string(&mut body).unwrap();
    body
}

#[tokio::test(flavor = "multi_thread")]
async fn serves_until_shutdown_then_exits_zero() {
    if !python3_available() {
        eprintln!("python3 not available; skipping");
        return;
    }
    let (project, _) = Project::standard();
    project.builder().build().unwrap();
    let port = free_port();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut launcher = Launcher::new(launch_config(&project, port));
    let serving = tokio::spawn(async move {
        let termination = launcher
            .run_until(async move {
                let _ = stop_rx.await;
                ShutdownReason::Requested
            })
            .await;
        (termination, launcher.state())
    });

    let ready = strata_launcher::wait_until_accepting(
        ([127, 0, 0, 1], port).into(),
        Duration::from_secs(10),
    )
    .await;
    assert!(ready);
    let response = tokio::task::spawn_blocking(move || fetch(port)).await.unwrap();
    assert!(response.ends_with("ok"));

    stop_tx.send(()).unwrap();
    let (termination, state) = serving.await.unwrap();
    let termination = termination.unwrap();
    assert!(matches!(termination, Termination::Shutdown { reason: ShutdownReason::Requested, .. }));
    assert_eq!(termination.exit_code(), 0);
    assert_eq!(state, Lifecycle::Terminated);
}

#[tokio::test(flavor = "multi_thread")]
async fn server_exit_while_serving_is_nonzero() {
    if !python3_available() {
        eprintln!("python3 not available; skipping");
        return;
    }
    let (project, _) = Project::standard();
    project.builder().build().unwrap();
    fs::write(project.root().join("server.env"), "FAKE_SERVER_EXIT_AFTER=2\n").unwrap();
    let port = free_port();

    let mut config = launch_config(&project, port);
    config.settings.env_file = Some(project.root().join("server.env"));
    let mut launcher = Launcher::new(config);
    let serving = tokio::spawn(async move { launcher.run_until(std::future::pending()).await });

    // The readiness probe is the first connection; this is the second.
    assert!(
        strata_launcher::wait_until_accepting(([127, 0, 0, 1], port).into(), Duration::from_secs(10))
            .await
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    let termination = serving.await.unwrap().unwrap();
    assert!(matches!(termination, Termination::ServerExited { .. }));
    assert_eq!(termination.exit_code(), 7);
}

#[tokio::test]
async fn unresolvable_reference_binds_nothing() {
    let (project, _) = Project::standard();
    project.builder().build().unwrap();
    let port = free_port();

    let mut config = launch_config(&project, port);
    config.settings.app = "app.main:application".parse().unwrap();
    let mut launcher = Launcher::new(config);
    let err = launcher
        .run_until(async { ShutdownReason::Requested })
        .await
        .unwrap_err();

    assert!(matches!(err, LaunchError::ReferenceResolution { .. }));
    assert!(TcpStream::connect(("127.0.0.1", port)).is_err());
}

#[tokio::test]
async fn reference_into_site_packages_resolves() {
    let (project, _) = Project::standard();
    project.builder().build().unwrap();

    let mut config = launch_config(&project, free_port());
    config.settings.app = "starlette.applications:Starlette".parse().unwrap();
    let prepared = Launcher::new(config).prepare().unwrap();
    assert!(prepared.app.module_file.starts_with(project.environment()));
}

#[tokio::test]
async fn occupied_port_is_a_bind_error() {
    let (project, _) = Project::standard();
    project.builder().build().unwrap();
    let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = held.local_addr().unwrap().port();

    let mut launcher = Launcher::new(launch_config(&project, port));
    let err = launcher
        .run_until(async { ShutdownReason::Requested })
        .await
        .unwrap_err();
    assert!(matches!(err, LaunchError::PortBind { .. }));
}
