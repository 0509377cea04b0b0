//! Dependency requirement strings: `name[extra1,extra2] >=1.0,<2 ; marker`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::name::{PackageName, PackageNameError};
use crate::specifier::{SpecifierParseError, SpecifierSet};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequirementParseError {
    #[error("invalid requirement '{raw}': {source}")]
    Name {
        raw: String,
        #[source]
        source: PackageNameError,
    },
    #[error("invalid requirement '{raw}': {source}")]
    Specifier {
        raw: String,
        #[source]
        source: SpecifierParseError,
    },
    #[error("unclosed '{open}' in requirement '{raw}'")]
    Unclosed { raw: String, open: char },
    #[error("direct URL requirements are not supported: '{0}'")]
    DirectUrl(String),
}

/// One declared dependency.
///
/// Extras and environment markers are kept for display and comparison but
/// never evaluated: every requirement is treated as unconditional.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Requirement {
    name: PackageName,
    extras: BTreeSet<String>,
    specifiers: SpecifierSet,
    marker: Option<String>,
}

impl Requirement {
    #[must_use]
    pub fn name(&self) -> &PackageName {
        &self.name
    }

    #[must_use]
    pub fn extras(&self) -> &BTreeSet<String> {
        &self.extras
    }

    #[must_use]
    pub fn specifiers(&self) -> &SpecifierSet {
        &self.specifiers
    }

    #[must_use]
    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }
}

impl FromStr for Requirement {
    type Err = RequirementParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (body, marker) = match raw.split_once(';') {
            Some((body, marker)) => {
                let marker = marker.trim();
                (body.trim(), (!marker.is_empty()).then(|| marker.to_string()))
            }
            None => (raw, None),
        };
        if body.contains('@') {
            return Err(RequirementParseError::DirectUrl(raw.to_string()));
        }

        let name_end = body
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .unwrap_or(body.len());
        let name = PackageName::new(&body[..name_end]).map_err(|source| {
            RequirementParseError::Name {
                raw: raw.to_string(),
                source,
            }
        })?;
        let mut rest = body[name_end..].trim_start();

        let mut extras = BTreeSet::new();
        if let Some(after) = rest.strip_prefix('[') {
            let (inside, tail) = after.split_once(']').ok_or_else(|| {
                RequirementParseError::Unclosed {
                    raw: raw.to_string(),
                    open: '[',
                }
            })?;
            extras = inside
                .split(',')
                .map(|extra| extra.trim().to_ascii_lowercase())
                .filter(|extra| !extra.is_empty())
                .collect();
            rest = tail.trim_start();
        }

        if let Some(after) = rest.strip_prefix('(') {
            rest = after
                .strip_suffix(')')
                .ok_or_else(|| RequirementParseError::Unclosed {
                    raw: raw.to_string(),
                    open: '(',
                })?
                .trim();
        }

        let specifiers = rest
            .parse()
            .map_err(|source| RequirementParseError::Specifier {
                raw: raw.to_string(),
                source,
            })?;

        Ok(Self {
            name,
            extras,
            specifiers,
            marker,
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        if !self.specifiers.is_empty() {
            write!(f, "{}", self.specifiers)?;
        }
        if let Some(marker) = &self.marker {
            write!(f, " ; {marker}")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Requirement {
    type Error = RequirementParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Requirement> for String {
    fn from(value: Requirement) -> Self {
        value.to_string()
    }
}
