//! Release versions (a PEP 440 subset).
//!
//! Supported: epochs (`1!2.0`), numeric release segments, `a`/`b`/`rc`
//! pre-releases, `.post` releases and `.dev` releases, with the usual
//! alternate spellings (`alpha`, `beta`, `c`, `pre`, `preview`, `rev`, `r`,
//! implicit `-N` post releases). Local version labels (`+abc`) are rejected.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("version must not be empty")]
    Empty,
    #[error("local version labels are not supported: '{0}'")]
    LocalLabel(String),
    #[error("invalid version '{0}'")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreKind {
    Alpha,
    Beta,
    Rc,
}

impl PreKind {
    const fn as_str(self) -> &'static str {
        match self {
            PreKind::Alpha => "a",
            PreKind::Beta => "b",
            PreKind::Rc => "rc",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
}

/// Sort helper: `Below` < any `At(_)` < `Above`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Slot<T> {
    Below,
    At(T),
    Above,
}

impl Version {
    #[must_use]
    pub fn from_release(release: &[u64]) -> Self {
        Self {
            epoch: 0,
            release: release.to_vec(),
            pre: None,
            post: None,
            dev: None,
        }
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    #[must_use]
    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    /// Same epoch and release segments (trailing zeros ignored).
    #[must_use]
    pub fn same_release(&self, other: &Version) -> bool {
        self.epoch == other.epoch && trimmed(&self.release) == trimmed(&other.release)
    }

    /// The public release without pre/post/dev parts.
    #[must_use]
    pub fn base(&self) -> Version {
        Version {
            epoch: self.epoch,
            release: self.release.clone(),
            pre: None,
            post: None,
            dev: None,
        }
    }

    fn pre_slot(&self) -> Slot<(PreKind, u64)> {
        match (self.pre, self.post, self.dev) {
            // 1.0.dev1 sorts before 1.0a1
            (None, None, Some(_)) => Slot::Below,
            (Some(pre), _, _) => Slot::At(pre),
            _ => Slot::Above,
        }
    }

    fn post_slot(&self) -> Slot<u64> {
        self.post.map_or(Slot::Below, Slot::At)
    }

    fn dev_slot(&self) -> Slot<u64> {
        self.dev.map_or(Slot::Above, Slot::At)
    }
}

fn trimmed(release: &[u64]) -> &[u64] {
    let end = release
        .iter()
        .rposition(|&n| n != 0)
        .map_or(0, |idx| idx + 1);
    &release[..end]
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| trimmed(&self.release).cmp(trimmed(&other.release)))
            .then_with(|| self.pre_slot().cmp(&other.pre_slot()))
            .then_with(|| self.post_slot().cmp(&other.post_slot()))
            .then_with(|| self.dev_slot().cmp(&other.dev_slot()))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        trimmed(&self.release).hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        for (idx, part) in self.release.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
        }
        if let Some((kind, n)) = self.pre {
            write!(f, "{}{n}", kind.as_str())?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{n}")?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{n}")?;
        }
        Ok(())
    }
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn number(&mut self) -> Option<u64> {
        let digits = self
            .rest()
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        if digits == 0 {
            return None;
        }
        let value = self.rest()[..digits].parse().ok()?;
        self.pos += digits;
        Some(value)
    }

    fn separator(&mut self) -> bool {
        if self.rest().starts_with(['.', '-', '_']) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume an optional separator followed by one of `keywords`.
    /// Restores the position when no keyword matches.
    fn keyword(&mut self, keywords: &[&'static str]) -> Option<&'static str> {
        let start = self.pos;
        self.separator();
        for kw in keywords {
            if self.rest().starts_with(kw) {
                self.pos += kw.len();
                return Some(kw);
            }
        }
        self.pos = start;
        None
    }

    /// Optional separator + number; absent number means 0.
    fn trailing_number(&mut self) -> u64 {
        let start = self.pos;
        self.separator();
        match self.number() {
            Some(n) => n,
            None => {
                self.pos = start;
                0
            }
        }
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        if lowered.is_empty() {
            return Err(VersionParseError::Empty);
        }
        if lowered.contains('+') {
            return Err(VersionParseError::LocalLabel(s.trim().to_string()));
        }
        let invalid = || VersionParseError::Invalid(s.trim().to_string());
        let text = lowered.strip_prefix('v').unwrap_or(&lowered);

        let (epoch, text) = match text.split_once('!') {
            Some((epoch, rest)) => (epoch.parse::<u64>().map_err(|_| invalid())?, rest),
            None => (0, text),
        };

        let mut cur = Cursor { text, pos: 0 };
        let mut release = vec![cur.number().ok_or_else(invalid)?];
        while cur.rest().starts_with('.')
            && cur.rest()[1..].starts_with(|c: char| c.is_ascii_digit())
        {
            cur.pos += 1;
            release.push(cur.number().ok_or_else(invalid)?);
        }

        let pre = cur
            .keyword(&["alpha", "beta", "preview", "pre", "rc", "a", "b", "c"])
            .map(|kw| {
                let kind = match kw {
                    "alpha" | "a" => PreKind::Alpha,
                    "beta" | "b" => PreKind::Beta,
                    _ => PreKind::Rc,
                };
                (kind, cur.trailing_number())
            });

        let post = if cur.keyword(&["post", "rev", "r"]).is_some() {
            Some(cur.trailing_number())
        } else if cur.rest().starts_with('-')
            && cur.rest()[1..].starts_with(|c: char| c.is_ascii_digit())
        {
            cur.pos += 1;
            cur.number()
        } else {
            None
        };

        let dev = cur
            .keyword(&["dev"])
            .map(|_| cur.trailing_number());

        if !cur.at_end() {
            return Err(invalid());
        }

        Ok(Self {
            epoch,
            release,
            pre,
            post,
            dev,
        })
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}
