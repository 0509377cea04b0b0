//! `<module-path>:<attribute>` application references.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppReferenceError {
    #[error("application reference '{0}' must have the form <module>:<attribute>")]
    MissingColon(String),
    #[error("application reference '{raw}' has an invalid {part} path")]
    InvalidPath { raw: String, part: &'static str },
}

/// Where the ASGI application object lives, e.g. `app.main:app`.
///
/// Both halves are dotted identifier paths. The attribute half may be nested
/// (`app.main:factory.instance`); only its first segment is checked during
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppReference {
    module: Vec<String>,
    attribute: Vec<String>,
}

impl AppReference {
    #[must_use]
    pub fn module_segments(&self) -> &[String] {
        &self.module
    }

    #[must_use]
    pub fn module_path(&self) -> String {
        self.module.join(".")
    }

    #[must_use]
    pub fn attribute_path(&self) -> String {
        self.attribute.join(".")
    }

    #[must_use]
    pub fn root_attribute(&self) -> &str {
        // Parsing guarantees at least one segment.
        self.attribute.first().map_or("", String::as_str)
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn split_path(raw: &str, path: &str, part: &'static str) -> Result<Vec<String>, AppReferenceError> {
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    if segments.iter().all(|segment| is_identifier(segment)) {
        Ok(segments)
    } else {
        Err(AppReferenceError::InvalidPath {
            raw: raw.to_string(),
            part,
        })
    }
}

impl FromStr for AppReference {
    type Err = AppReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (module, attribute) = raw
            .split_once(':')
            .ok_or_else(|| AppReferenceError::MissingColon(raw.to_string()))?;
        Ok(Self {
            module: split_path(raw, module, "module")?,
            attribute: split_path(raw, attribute, "attribute")?,
        })
    }
}

impl fmt::Display for AppReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module_path(), self.attribute_path())
    }
}

impl TryFrom<String> for AppReference {
    type Error = AppReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AppReference> for String {
    fn from(value: AppReference) -> Self {
        value.to_string()
    }
}
