//! Version specifiers (`>=1.0, <2`, `~=1.4.2`, `==3.*`).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::version::{Version, VersionParseError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecifierParseError {
    #[error("missing comparison operator in '{0}'")]
    MissingOperator(String),
    #[error("wildcard is only allowed with == and != in '{0}'")]
    MisplacedWildcard(String),
    #[error("~= requires at least two release segments in '{0}'")]
    CompatibleTooShort(String),
    #[error("invalid version in specifier '{clause}': {source}")]
    Version {
        clause: String,
        #[source]
        source: VersionParseError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterEqual,
    LessEqual,
    Greater,
    Less,
    Compatible,
    Arbitrary,
}

impl Operator {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::GreaterEqual => ">=",
            Operator::LessEqual => "<=",
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::Compatible => "~=",
            Operator::Arbitrary => "===",
        }
    }
}

// Longest first so `===` is not read as `==`.
const OPERATORS: &[(&str, Operator)] = &[
    ("===", Operator::Arbitrary),
    ("==", Operator::Equal),
    ("!=", Operator::NotEqual),
    (">=", Operator::GreaterEqual),
    ("<=", Operator::LessEqual),
    ("~=", Operator::Compatible),
    (">", Operator::Greater),
    ("<", Operator::Less),
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Target {
    Exact(Version),
    /// `==1.2.*`: release prefix only.
    Prefix(Vec<u64>, u64),
    /// `===`: compared as text.
    Literal(String),
}

/// A single `<op><version>` clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Specifier {
    op: Operator,
    target: Target,
}

impl Specifier {
    #[must_use]
    pub fn operator(&self) -> Operator {
        self.op
    }

    /// Whether `version` satisfies this clause.
    ///
    /// Pre-releases are never excluded implicitly: a locked pre-release was
    /// chosen on purpose, so only the comparison itself decides.
    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        match (&self.target, self.op) {
            (Target::Literal(text), _) => version.to_string() == *text,
            (Target::Prefix(prefix, epoch), Operator::Equal) => {
                prefix_matches(version, prefix, *epoch)
            }
            (Target::Prefix(prefix, epoch), _) => !prefix_matches(version, prefix, *epoch),
            (Target::Exact(spec), op) => match op {
                Operator::Equal => version == spec,
                Operator::NotEqual => version != spec,
                Operator::GreaterEqual => version >= spec,
                Operator::LessEqual => version <= spec,
                Operator::Greater => {
                    version > spec
                        && (spec.is_postrelease()
                            || !(version.is_postrelease() && version.same_release(spec)))
                }
                Operator::Less => {
                    version < spec
                        && (spec.is_prerelease()
                            || !(version.is_prerelease() && version.same_release(spec)))
                }
                Operator::Compatible => {
                    let release = spec.release();
                    let prefix = &release[..release.len() - 1];
                    version >= spec && prefix_matches(version, prefix, spec.epoch())
                }
                // `===` always parses to a literal target
                Operator::Arbitrary => false,
            },
        }
    }
}

fn prefix_matches(version: &Version, prefix: &[u64], epoch: u64) -> bool {
    if version.epoch() != epoch {
        return false;
    }
    let release = version.release();
    prefix
        .iter()
        .enumerate()
        .all(|(idx, want)| release.get(idx).copied().unwrap_or(0) == *want)
}

impl FromStr for Specifier {
    type Err = SpecifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clause = s.trim();
        let (op, rest) = OPERATORS
            .iter()
            .find_map(|(text, op)| clause.strip_prefix(text).map(|rest| (*op, rest.trim())))
            .ok_or_else(|| SpecifierParseError::MissingOperator(clause.to_string()))?;

        if op == Operator::Arbitrary {
            return Ok(Self {
                op,
                target: Target::Literal(rest.to_ascii_lowercase()),
            });
        }

        let version_err = |source| SpecifierParseError::Version {
            clause: clause.to_string(),
            source,
        };

        if let Some(base) = rest.strip_suffix(".*") {
            if !matches!(op, Operator::Equal | Operator::NotEqual) {
                return Err(SpecifierParseError::MisplacedWildcard(clause.to_string()));
            }
            let version: Version = base.parse().map_err(version_err)?;
            return Ok(Self {
                op,
                target: Target::Prefix(version.release().to_vec(), version.epoch()),
            });
        }

        let version: Version = rest.parse().map_err(version_err)?;
        if op == Operator::Compatible && version.release().len() < 2 {
            return Err(SpecifierParseError::CompatibleTooShort(clause.to_string()));
        }
        Ok(Self {
            op,
            target: Target::Exact(version),
        })
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op.as_str())?;
        match &self.target {
            Target::Exact(version) => write!(f, "{version}"),
            Target::Prefix(release, epoch) => {
                if *epoch != 0 {
                    write!(f, "{epoch}!")?;
                }
                let parts: Vec<String> = release.iter().map(ToString::to_string).collect();
                write!(f, "{}.*", parts.join("."))
            }
            Target::Literal(text) => f.write_str(text),
        }
    }
}

/// A comma-separated conjunction of clauses. Empty means "any version".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SpecifierSet(Vec<Specifier>);

impl SpecifierSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn contains(&self, version: &Version) -> bool {
        self.0.iter().all(|spec| spec.contains(version))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Specifier> {
        self.0.iter()
    }
}

impl FromStr for SpecifierSet {
    type Err = SpecifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, spec) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{spec}")?;
        }
        Ok(())
    }
}
