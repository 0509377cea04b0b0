//! Runtime entry point: resolve, bind, spawn, serve until told to stop.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use strata_builder::EnvironmentLayout;
use strata_types::LaunchSettings;
use tokio::process::Command;

use crate::error::LaunchError;
use crate::port::{ensure_port_free, wait_until_accepting};
use crate::process::ServerProcess;
use crate::reference::{ResolvedApp, resolve_reference};
use crate::search_path::SearchPath;

/// Linear, non-retrying lifecycle of one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    NotStarted,
    Serving,
    Terminated,
}

/// What asked the launcher to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
    Requested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Shutdown was initiated from outside; the server was stopped.
    Shutdown {
        reason: ShutdownReason,
        status: ExitStatus,
    },
    /// The server exited while serving without being asked to.
    ServerExited { status: ExitStatus },
}

impl Termination {
    /// Process exit code for the launcher itself.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Termination::Shutdown { .. } => 0,
            Termination::ServerExited { status } => status.code().filter(|c| *c != 0).unwrap_or(1),
        }
    }
}

/// Inputs of a launch beyond [`LaunchSettings`].
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub settings: LaunchSettings,
    /// Directory searched first for the application module.
    pub app_dir: PathBuf,
    /// Runtime environment produced by the builder.
    pub environment: PathBuf,
    /// `PATH` inherited from the launcher's own environment.
    pub inherited_path: Option<OsString>,
}

impl LaunchConfig {
    #[must_use]
    pub fn new(settings: LaunchSettings, app_dir: PathBuf, environment: PathBuf) -> Self {
        Self {
            settings,
            app_dir,
            environment,
            inherited_path: std::env::var_os("PATH"),
        }
    }
}

/// Everything checked before any socket is bound or process spawned.
#[derive(Debug)]
pub struct PreparedLaunch {
    pub app: ResolvedApp,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(OsString, OsString)>,
}

pub struct Launcher {
    config: LaunchConfig,
    state: Lifecycle,
}

impl Launcher {
    #[must_use]
    pub fn new(config: LaunchConfig) -> Self {
        Self {
            config,
            state: Lifecycle::NotStarted,
        }
    }

    #[must_use]
    pub fn state(&self) -> Lifecycle {
        self.state
    }

    fn load_env_file(path: &Path) -> Result<Vec<(OsString, OsString)>, LaunchError> {
        let env_file_error = |err: dotenvy::Error| LaunchError::EnvFile {
            path: path.to_path_buf(),
            message: err.to_string(),
        };
        let mut vars = Vec::new();
        for item in dotenvy::from_path_iter(path).map_err(env_file_error)? {
            let (key, value) = item.map_err(env_file_error)?;
            vars.push((OsString::from(key), OsString::from(value)));
        }
        Ok(vars)
    }

    /// Resolve the application, locate the server and assemble its command
    /// line and environment. Fails without side effects.
    pub fn prepare(&self) -> Result<PreparedLaunch, LaunchError> {
        let settings = &self.config.settings;
        let layout = EnvironmentLayout::new(&self.config.environment);
        if !layout.is_environment() {
            return Err(LaunchError::EnvironmentMissing {
                path: self.config.environment.clone(),
            });
        }

        let site_packages = layout.site_packages();
        let roots = [self.config.app_dir.clone(), site_packages.clone()];
        let app = resolve_reference(&settings.app, &roots)?;

        let search_path =
            SearchPath::with_environment(&layout.bin(), self.config.inherited_path.as_ref());
        let program = search_path.find(settings.server.program(), &self.config.app_dir)?;

        let mut args = vec![
            "--host".to_string(),
            settings.bind.host().to_string(),
            "--port".to_string(),
            settings.bind.port().to_string(),
        ];
        args.extend(settings.server.args().iter().cloned());
        args.push(settings.app.to_string());

        let mut env = match &settings.env_file {
            Some(path) => Self::load_env_file(path)?,
            None => Vec::new(),
        };
        let python_path = std::env::join_paths([&self.config.app_dir, &site_packages])?;
        env.push(("PATH".into(), search_path.to_os_string()?));
        env.push(("VIRTUAL_ENV".into(), layout.root().as_os_str().to_owned()));
        env.push(("PYTHONPATH".into(), python_path));
        env.push(("PYTHONDONTWRITEBYTECODE".into(), "1".into()));

        Ok(PreparedLaunch {
            app,
            program,
            args,
            env,
        })
    }

    fn command(&self, prepared: &PreparedLaunch) -> Command {
        let mut command = Command::new(&prepared.program);
        command
            .args(&prepared.args)
            .current_dir(&self.config.app_dir)
            .envs(prepared.env.iter().map(|(k, v)| (k, v)));
        command
    }

    /// Serve until SIGINT/SIGTERM or until the server exits.
    pub async fn run(&mut self) -> Result<Termination, LaunchError> {
        let mut signals = ShutdownSignals::install().map_err(LaunchError::io("install signal handlers"))?;
        self.run_until(async move { signals.recv().await }).await
    }

    /// Serve until `shutdown` completes or the server exits.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<Termination, LaunchError>
    where
        F: Future<Output = ShutdownReason>,
    {
        if self.state != Lifecycle::NotStarted {
            return Err(LaunchError::io("start launcher")(io::Error::other(
                "a launcher runs at most once",
            )));
        }
        let result = self.serve(shutdown).await;
        self.state = Lifecycle::Terminated;
        result
    }

    async fn serve<F>(&mut self, shutdown: F) -> Result<Termination, LaunchError>
    where
        F: Future<Output = ShutdownReason>,
    {
        let prepared = self.prepare()?;
        let bind = self.config.settings.bind;
        ensure_port_free(bind.socket_addr())?;

        let mut process = ServerProcess::spawn(self.command(&prepared))
            .map_err(LaunchError::io("spawn server"))?;
        tracing::info!(
            pid = ?process.pid(),
            program = %prepared.program.display(),
            app = %prepared.app.reference,
            "Started server"
        );

        let grace = self.config.settings.shutdown_grace;
        let timeout = self.config.settings.startup_timeout;
        tokio::pin!(shutdown);

        tokio::select! {
            ready = wait_until_accepting(bind.probe_addr(), timeout) => {
                if !ready {
                    if let Err(err) = process.terminate(grace).await {
                        tracing::warn!(pid = ?process.pid(), "Failed to stop server after startup timeout: {err}");
                    }
                    return Err(LaunchError::StartupTimeout { addr: bind.socket_addr(), timeout });
                }
            }
            status = process.wait() => {
                let status = status.map_err(LaunchError::io("wait for server"))?;
                return Err(LaunchError::ServerExited { status });
            }
            reason = &mut shutdown => {
                tracing::info!(?reason, "Shutdown requested during startup");
                let status = process.terminate(grace).await.map_err(LaunchError::io("stop server"))?;
                return Ok(Termination::Shutdown { reason, status });
            }
        }

        self.state = Lifecycle::Serving;
        tracing::info!(address = %bind, app = %prepared.app.reference, "Serving");

        tokio::select! {
            status = process.wait() => {
                let status = status.map_err(LaunchError::io("wait for server"))?;
                tracing::error!(%status, "Server exited unexpectedly");
                Ok(Termination::ServerExited { status })
            }
            reason = &mut shutdown => {
                tracing::info!(?reason, grace_secs = grace.as_secs(), "Stopping server");
                let status = process.terminate(grace).await.map_err(LaunchError::io("stop server"))?;
                tracing::info!(%status, "Server stopped");
                Ok(Termination::Shutdown { reason, status })
            }
        }
    }
}

/// SIGINT/SIGTERM listeners, installed before the server is spawned.
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    pub async fn recv(&mut self) -> ShutdownReason {
        tokio::select! {
            _ = self.interrupt.recv() => ShutdownReason::Interrupt,
            _ = self.terminate.recv() => ShutdownReason::Terminate,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> ShutdownReason {
        let _ = tokio::signal::ctrl_c().await;
        ShutdownReason::Interrupt
    }
}
