//! Shared test utilities and fixtures
//!
//! A [`Project`] is a temporary directory holding a pyproject, a lock, a
//! local package index and an application package, wired together the way
//! a real build stage sees them.

#![allow(dead_code)]

use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};

use strata_builder::Builder;
use strata_config::{Overrides, RawConfig, StrataConfig, resolve};
use strata_types::Digest;
use strata_utils::tree_digest;
use tempfile::TempDir;

/// Minimal ASGI-server stand-in: imports the app reference, serves a fixed
/// response and exits cleanly on SIGTERM. `FAKE_SERVER_EXIT_AFTER=N` makes it
/// exit with status 7 after N connections.
pub const FAKE_SERVER: &str = r#"#!/usr/bin/env python3
import argparse, importlib, os, signal, socket, sys

parser = argparse.ArgumentParser()
parser.add_argument("--host")
parser.add_argument("--port", type=int)
parser.add_argument("app")
args, _ = parser.parse_known_args()

module, attr = args.app.split(":")
target = importlib.import_module(module)
for part in attr.split("."):
    target = getattr(target, part)

signal.signal(signal.SIGTERM, lambda *_: sys.exit(0))
sock = socket.socket(socket.AF_INET, socket.SOCK_STREAM)
sock.setsockopt(socket.SOL_SOCKET, socket.SO_REUSEADDR, 1)
sock.bind((args.host, args.port))
sock.listen(16)

limit = int(os.environ.get("FAKE_SERVER_EXIT_AFTER", "0"))
served = 0
while True:
    conn, _ = sock.accept()
    try:
        conn.sendall(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok")
    except OSError:
        pass
    finally:
        conn.close()
    served += 1
    if limit and served >= limit:
        sys.exit(7)
"#;

/// One package placed in the local index.
#[derive(Debug, Clone)]
pub struct IndexedPackage {
    pub name: String,
    pub version: String,
    pub hash: Digest,
    pub dependencies: Vec<String>,
}

pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("project")).unwrap();
        Self { dir }
    }

    /// A FastAPI-shaped project: `starlette` → `anyio` → `sniffio`, plus a
    /// `uvicorn` that ships `bin/uvicorn`. Dependencies `starlette>=0.27`
    /// and `uvicorn>=0.29`, app at `app.main:app`.
    pub fn standard() -> (Self, Vec<IndexedPackage>) {
        let project = Self::new();
        let packages = vec![
            project.index_package(
                "sniffio",
                "1.3.1",
                &[("sniffio/__init__.py", "__version__ = '1.3.1'\n")],
                &[],
            ),
            project.index_package(
                "anyio",
                "4.3.0",
                &[("anyio/__init__.py", "import sniffio\n")],
                &["sniffio"],
            ),
            project.index_package(
                "starlette",
                "0.37.2",
                &[
                    ("starlette/__init__.py", ""),
                    ("starlette/applications.py", "class Starlette:\n    pass\n"),
                ],
                &["anyio"],
            ),
            project.index_package(
                "uvicorn",
                "0.29.0",
                &[("uvicorn/__init__.py", ""), ("bin/uvicorn", FAKE_SERVER)],
                &[],
            ),
        ];
        project.write_pyproject(&["starlette>=0.27", "uvicorn>=0.29"]);
        project.write_lock(&packages, Some(&["starlette>=0.27", "uvicorn>=0.29"]));
        project.write_app("app = Starlette()\n");
        (project, packages)
    }

    pub fn base(&self) -> &Path {
        self.dir.path()
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("project")
    }

    pub fn environment(&self) -> PathBuf {
        self.root().join(".venv")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root().join("packages")
    }

    /// Write a package tree into the index and return its lock entry.
    pub fn index_package(
        &self,
        name: &str,
        version: &str,
        files: &[(&str, &str)],
        dependencies: &[&str],
    ) -> IndexedPackage {
        let root = self.index_dir().join(name).join(version);
        for (relative, contents) in files {
            let path = root.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, contents).unwrap();
            if relative.starts_with("bin/") {
                make_executable(&path);
            }
        }
        IndexedPackage {
            name: name.to_string(),
            version: version.to_string(),
            hash: tree_digest(&root).unwrap(),
            dependencies: dependencies.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn write_pyproject(&self, dependencies: &[&str]) {
        let deps: Vec<String> = dependencies.iter().map(|d| format!("{d:?}")).collect();
        fs::write(
            self.root().join("pyproject.toml"),
            format!(
                "[project]\nname = \"svc\"\nversion = \"0.1.0\"\nrequires-python = \">=3.11\"\ndependencies = [{}]\n\n[project.scripts]\nsvc-admin = \"app.main:admin\"\n\n[tool.strata]\npackages = [\"app\"]\n",
                deps.join(", ")
            ),
        )
        .unwrap();
    }

    pub fn write_lock(&self, packages: &[IndexedPackage], manifest: Option<&[&str]>) {
        let mut text = String::from("version = 1\n");
        if let Some(manifest) = manifest {
            let deps: Vec<String> = manifest.iter().map(|d| format!("{d:?}")).collect();
            text.push_str(&format!("\n[manifest]\ndependencies = [{}]\n", deps.join(", ")));
        }
        for package in packages {
            let deps: Vec<String> = package.dependencies.iter().map(|d| format!("{d:?}")).collect();
            text.push_str(&format!(
                "\n[[package]]\nname = \"{}\"\nversion = \"{}\"\nhash = \"{}\"\ndependencies = [{}]\n",
                package.name,
                package.version,
                package.hash,
                deps.join(", ")
            ));
        }
        fs::write(self.lock_path(), text).unwrap();
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root().join("strata.lock")
    }

    pub fn write_app(&self, main: &str) {
        let app = self.root().join("app");
        fs::create_dir_all(app.join("__pycache__")).unwrap();
        fs::write(app.join("__init__.py"), "").unwrap();
        fs::write(
            app.join("main.py"),
            format!("from starlette.applications import Starlette\n\n{main}\ndef admin():\n    return 0\n"),
        )
        .unwrap();
        fs::write(app.join("__pycache__/main.cpython-312.pyc"), [0u8, 1]).unwrap();
    }

    /// Resolved config rooted at the project, caching into [`Self::cache_dir`].
    pub fn config(&self) -> StrataConfig {
        let text = format!(
            "[build]\ncache_dir = {:?}\n\n[launch]\nhost = \"127.0.0.1\"\nstartup_timeout_secs = 10\nshutdown_grace_secs = 5\n",
            self.cache_dir().display().to_string()
        );
        let raw = RawConfig::parse(&text, Path::new("strata.toml")).unwrap();
        resolve(&self.root(), raw, &Overrides::default()).unwrap()
    }

    pub fn builder(&self) -> Builder {
        let config = self.config();
        Builder::new(config.paths, config.build)
    }

    pub fn uncached_builder(&self) -> Builder {
        let config = self.config();
        Builder::new(config.paths, config.build.without_cache())
    }
}

#[cfg(unix)]
pub fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) {}

pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Launch tests run the fake server with the system `python3`.
pub fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

/// Run the `strata` binary in the project directory with caching into the
/// fixture's cache dir.
pub fn strata(project: &Project) -> std::process::Command {
    let mut cmd = std::process::Command::new(env!("CARGO_BIN_EXE_strata"));
    cmd.current_dir(project.root())
        .env("STRATA_CACHE_DIR", project.cache_dir())
        .env("RUST_LOG", "warn")
        .env_remove("STRATA_CONFIG")
        .env_remove("STRATA_APP")
        .env_remove("STRATA_HOST")
        .env_remove("STRATA_PORT")
        .env_remove("STRATA_ENV_DIR");
    cmd
}
