//! Resolved configuration types shared across crates.
//!
//! Raw TOML deserialization structs (with `Option` fields) stay private in
//! `strata-config`. The config loader resolves them into these types at the
//! parse boundary, so holding one of these values means it was validated.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::app_ref::AppReference;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const DEFAULT_APP: &str = "app.main:app";
pub const DEFAULT_SERVER: &str = "uvicorn";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("server command must not be empty")]
    EmptyServerCommand,
    #[error("port 0 is not allowed; the service needs a fixed port")]
    PortZero,
}

/// Where the project descriptor and lock file live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    root: PathBuf,
    manifest: PathBuf,
    lock: PathBuf,
}

impl ProjectPaths {
    /// `manifest` and `lock` are joined onto `root` when relative.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, manifest: &Path, lock: &Path) -> Self {
        let root = root.into();
        Self {
            manifest: root.join(manifest),
            lock: root.join(lock),
            root,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn manifest(&self) -> &Path {
        &self.manifest
    }

    #[must_use]
    pub fn lock(&self) -> &Path {
        &self.lock
    }
}

/// Whether dependency layers are cached, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachePolicy {
    Disabled,
    Layers(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    environment: PathBuf,
    index: PathBuf,
    cache: CachePolicy,
}

impl BuildSettings {
    #[must_use]
    pub fn new(environment: PathBuf, index: PathBuf, cache: CachePolicy) -> Self {
        Self {
            environment,
            index,
            cache,
        }
    }

    #[must_use]
    pub fn environment(&self) -> &Path {
        &self.environment
    }

    #[must_use]
    pub fn index(&self) -> &Path {
        &self.index
    }

    #[must_use]
    pub fn cache(&self) -> &CachePolicy {
        &self.cache
    }

    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.cache = CachePolicy::Disabled;
        self
    }
}

/// Validated host/port pair. The port is never 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindAddress {
    host: IpAddr,
    port: u16,
}

impl BindAddress {
    pub fn new(host: IpAddr, port: u16) -> Result<Self, SettingsError> {
        if port == 0 {
            return Err(SettingsError::PortZero);
        }
        Ok(Self { host, port })
    }

    #[must_use]
    pub fn host(&self) -> IpAddr {
        self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Address to dial when probing readiness. Wildcard binds are probed on
    /// loopback.
    #[must_use]
    pub fn probe_addr(&self) -> SocketAddr {
        let host = match self.host {
            IpAddr::V4(v4) if v4.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(v6) if v6.is_unspecified() => IpAddr::V6(std::net::Ipv6Addr::LOCALHOST),
            other => other,
        };
        SocketAddr::new(host, self.port)
    }
}

impl Default for BindAddress {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// The ASGI server program plus any extra arguments placed before the app
/// reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    program: String,
    args: Vec<String>,
}

impl ServerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self, SettingsError> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(SettingsError::EmptyServerCommand);
        }
        Ok(Self { program, args })
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    pub app: AppReference,
    pub bind: BindAddress,
    pub server: ServerCommand,
    pub env_file: Option<PathBuf>,
    pub startup_timeout: Duration,
    pub shutdown_grace: Duration,
}
