use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::LaunchError;

/// Ordered executable search directories handed to the server process.
///
/// Built explicitly instead of mutating the launcher's own `PATH`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    /// `bin` first, then every entry of `inherited`.
    #[must_use]
    pub fn with_environment(bin: &Path, inherited: Option<&OsString>) -> Self {
        let mut dirs = vec![bin.to_path_buf()];
        if let Some(inherited) = inherited {
            dirs.extend(env::split_paths(inherited).filter(|dir| dir.as_path() != bin));
        }
        Self { dirs }
    }

    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn to_os_string(&self) -> Result<OsString, LaunchError> {
        Ok(env::join_paths(&self.dirs)?)
    }

    /// Locate `program`. Names containing a path separator are used as given.
    pub fn find(&self, program: &str, cwd: &Path) -> Result<PathBuf, LaunchError> {
        let joined = self.to_os_string()?;
        which::which_in(program, Some(joined), cwd).map_err(|_| LaunchError::ServerNotFound {
            program: program.to_string(),
            search_path: self.to_string(),
        })
    }
}

impl std::fmt::Display for SearchPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.dirs.iter().map(|d| d.display().to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}
