//! `strata.toml` loading and resolution.
//!
//! The file is optional. Its raw form keeps every field optional; [`resolve`]
//! applies defaults, `STRATA_*` overrides and path anchoring, and returns the
//! validated types from `strata-types`.

mod env;

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use strata_types::{
    AppReference, BindAddress, BuildSettings, CachePolicy, DEFAULT_APP, DEFAULT_HOST,
    DEFAULT_PORT, DEFAULT_SERVER, LaunchSettings, ProjectPaths, ServerCommand,
};
use thiserror::Error;

pub use env::{Overrides, expand_env_vars};

pub const CONFIG_FILE: &str = "strata.toml";
const DEFAULT_MANIFEST: &str = "pyproject.toml";
const DEFAULT_LOCK: &str = "strata.lock";
const DEFAULT_ENVIRONMENT: &str = ".venv";
const DEFAULT_INDEX: &str = "packages";
const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {} does not exist", path.display())]
    Missing { path: PathBuf },
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProject {
    manifest: Option<String>,
    lock: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBuild {
    environment: Option<String>,
    cache_dir: Option<String>,
    index: Option<String>,
    #[serde(default)]
    no_cache: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLaunch {
    app: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    server: Option<String>,
    #[serde(default)]
    server_args: Vec<String>,
    env_file: Option<String>,
    startup_timeout_secs: Option<u64>,
    shutdown_grace_secs: Option<u64>,
}

/// Deserialized `strata.toml`, before defaults and overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    #[serde(default)]
    project: RawProject,
    #[serde(default)]
    build: RawBuild,
    #[serde(default)]
    launch: RawLaunch,
}

impl RawConfig {
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, source);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Load `path`. A missing file is `Ok(None)` unless `required`.
    pub fn load(path: &Path, required: bool) -> Result<Option<Self>, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                if required {
                    return Err(ConfigError::Missing {
                        path: path.to_path_buf(),
                    });
                }
                tracing::debug!(path = %path.display(), "No config file; using defaults");
                return Ok(None);
            }
            Err(source) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, source);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&content, path).map(Some)
    }
}

/// Fully resolved settings for one project.
#[derive(Debug, Clone)]
pub struct StrataConfig {
    pub paths: ProjectPaths,
    pub build: BuildSettings,
    pub launch: LaunchSettings,
    /// Config file that was read, if any.
    pub source: Option<PathBuf>,
}

fn default_cache_dir(root: &Path) -> PathBuf {
    dirs::cache_dir().map_or_else(|| root.join(".strata-cache"), |dir| dir.join("strata"))
}

fn anchored(root: &Path, value: &str) -> PathBuf {
    root.join(expand_env_vars(value))
}

fn invalid(field: &'static str) -> impl Fn(String) -> ConfigError {
    move |message| ConfigError::Invalid { field, message }
}

impl StrataConfig {
    /// Load `config` (or `<root>/strata.toml`) and resolve it with `overrides`.
    ///
    /// An explicitly named config file must exist; the default one may not.
    pub fn load(
        root: &Path,
        config: Option<&Path>,
        overrides: &Overrides,
    ) -> Result<Self, ConfigError> {
        let explicit = config
            .map(Path::to_path_buf)
            .or_else(|| overrides.config.clone());
        let (path, required) = match explicit {
            Some(path) => (root.join(path), true),
            None => (root.join(CONFIG_FILE), false),
        };
        let raw = RawConfig::load(&path, required)?;
        let source = raw.is_some().then_some(path);
        let mut config = resolve(root, raw.unwrap_or_default(), overrides)?;
        config.source = source;
        Ok(config)
    }
}

/// Apply defaults and `overrides` to `raw`. Relative paths are anchored at
/// `root`.
pub fn resolve(
    root: &Path,
    raw: RawConfig,
    overrides: &Overrides,
) -> Result<StrataConfig, ConfigError> {
    let RawConfig {
        project,
        build,
        launch,
    } = raw;

    let manifest = project.manifest.as_deref().unwrap_or(DEFAULT_MANIFEST);
    let lock = project.lock.as_deref().unwrap_or(DEFAULT_LOCK);
    let paths = ProjectPaths::new(
        root,
        &PathBuf::from(expand_env_vars(manifest)),
        &PathBuf::from(expand_env_vars(lock)),
    );

    let environment = overrides
        .env_dir
        .clone()
        .or(build.environment)
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
    let index = build.index.as_deref().unwrap_or(DEFAULT_INDEX);
    let cache = if build.no_cache {
        CachePolicy::Disabled
    } else {
        let dir = overrides
            .cache_dir
            .clone()
            .or(build.cache_dir)
            .map_or_else(|| default_cache_dir(root), |dir| anchored(root, &dir));
        CachePolicy::Layers(dir)
    };
    let build = BuildSettings::new(
        anchored(root, &environment),
        anchored(root, index),
        cache,
    );

    let app_raw = overrides
        .app
        .clone()
        .or(launch.app)
        .unwrap_or_else(|| DEFAULT_APP.to_string());
    let app: AppReference = expand_env_vars(&app_raw)
        .parse()
        .map_err(|err: strata_types::AppReferenceError| invalid("launch.app")(err.to_string()))?;

    let host = match overrides.host.clone().or(launch.host) {
        Some(host) => expand_env_vars(&host)
            .parse::<IpAddr>()
            .map_err(|err| invalid("launch.host")(format!("'{host}': {err}")))?,
        None => DEFAULT_HOST,
    };
    let port = match &overrides.port {
        Some(port) => port
            .parse::<u16>()
            .map_err(|err| invalid("STRATA_PORT")(format!("'{port}': {err}")))?,
        None => launch.port.unwrap_or(DEFAULT_PORT),
    };
    let bind = BindAddress::new(host, port).map_err(|err| invalid("launch.port")(err.to_string()))?;

    let server = ServerCommand::new(
        expand_env_vars(launch.server.as_deref().unwrap_or(DEFAULT_SERVER)),
        launch
            .server_args
            .iter()
            .map(|arg| expand_env_vars(arg))
            .collect(),
    )
    .map_err(|err| invalid("launch.server")(err.to_string()))?;

    let launch = LaunchSettings {
        app,
        bind,
        server,
        env_file: launch.env_file.map(|file| anchored(root, &file)),
        startup_timeout: Duration::from_secs(
            launch
                .startup_timeout_secs
                .unwrap_or(DEFAULT_STARTUP_TIMEOUT_SECS),
        ),
        shutdown_grace: Duration::from_secs(
            launch
                .shutdown_grace_secs
                .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
        ),
    };

    Ok(StrataConfig {
        paths,
        build,
        launch,
        source: None,
    })
}
