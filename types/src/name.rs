//! Normalized distribution names.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackageNameError {
    #[error("package name must not be empty")]
    Empty,
    #[error("invalid character {ch:?} in package name '{raw}'")]
    InvalidChar { raw: String, ch: char },
    #[error("package name '{0}' must start and end with a letter or digit")]
    BadBoundary(String),
}

/// A distribution name in its canonical form.
///
/// Canonicalization lowercases the name and collapses every run of `-`, `_`
/// and `.` into a single `-`, so `Typing_Extensions` and `typing.extensions`
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName(String);

impl PackageName {
    pub fn new(raw: &str) -> Result<Self, PackageNameError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PackageNameError::Empty);
        }
        if let Some(ch) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(PackageNameError::InvalidChar {
                raw: raw.to_string(),
                ch,
            });
        }
        let first_ok = raw.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
        let last_ok = raw.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
        if !first_ok || !last_ok {
            return Err(PackageNameError::BadBoundary(raw.to_string()));
        }

        let mut normalized = String::with_capacity(raw.len());
        let mut in_separator = false;
        for c in raw.chars() {
            if matches!(c, '-' | '_' | '.') {
                in_separator = true;
                continue;
            }
            if in_separator {
                normalized.push('-');
                in_separator = false;
            }
            normalized.push(c.to_ascii_lowercase());
        }
        Ok(Self(normalized))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The form used in `.dist-info` directory names (`-` replaced by `_`).
    #[must_use]
    pub fn as_dist_info_name(&self) -> String {
        self.0.replace('-', "_")
    }
}

impl TryFrom<String> for PackageName {
    type Error = PackageNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<PackageName> for String {
    fn from(value: PackageName) -> Self {
        value.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
