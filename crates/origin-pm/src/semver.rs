//! Semantic version parsing and ordering
//!
//! Versions follow `MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]`. Build metadata is
//! carried for display but never takes part in equality or ordering.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during version or range parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemverError {
    /// Malformed version text
    #[error("Invalid semantic version: {0}")]
    InvalidVersion(String),

    /// Malformed range expression
    #[error("Invalid version range: {0}")]
    InvalidRange(String),
}

/// Semantic version (MAJOR.MINOR.PATCH)
#[derive(Debug, Clone)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

impl Version {
    /// Parse a version string
    ///
    /// The whole string must be a version: no `v` prefix, no surrounding
    /// whitespace, no `1.0` shorthand and no leading zeros in numeric parts.
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        let invalid = || SemverError::InvalidVersion(s.to_string());

        // Split by + to separate build metadata
        let (version_part, build) = match s.split_once('+') {
            Some((v, b)) => (v, Some(b)),
            None => (s, None),
        };

        // Split by - to separate prerelease
        let (core_version, prerelease) = match version_part.split_once('-') {
            Some((v, p)) => (v, Some(p)),
            None => (version_part, None),
        };

        let parts: Vec<&str> = core_version.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }

        let major = parse_numeric(parts[0]).ok_or_else(invalid)?;
        let minor = parse_numeric(parts[1]).ok_or_else(invalid)?;
        let patch = parse_numeric(parts[2]).ok_or_else(invalid)?;

        if let Some(pre) = prerelease {
            if !is_valid_identifiers(pre) {
                return Err(invalid());
            }
        }
        if let Some(b) = build {
            if !is_valid_identifiers(b) {
                return Err(invalid());
            }
        }

        Ok(Version {
            major,
            minor,
            patch,
            prerelease: prerelease.map(String::from),
            build: build.map(String::from),
        })
    }

    /// Create a new release version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    /// Check if this is a prerelease version
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Next major version (minor and patch reset to 0), `None` on overflow
    pub fn bump_major(&self) -> Option<Self> {
        Some(Version::new(self.major.checked_add(1)?, 0, 0))
    }

    /// Next minor version (patch reset to 0), `None` on overflow
    pub fn bump_minor(&self) -> Option<Self> {
        Some(Version::new(self.major, self.minor.checked_add(1)?, 0))
    }

    /// Next patch version, `None` on overflow
    pub fn bump_patch(&self) -> Option<Self> {
        Some(Version::new(self.major, self.minor, self.patch.checked_add(1)?))
    }
}

/// Parse one numeric component, rejecting signs and leading zeros
fn parse_numeric(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if part.len() > 1 && part.starts_with('0') {
        return None;
    }
    part.parse().ok()
}

/// Dot-separated identifiers made of ASCII alphanumerics and hyphens
fn is_valid_identifiers(s: &str) -> bool {
    s.split('.').all(|id| {
        !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }
        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
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
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.prerelease.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Compare major, minor, patch
        match self.major.cmp(&other.major) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.minor.cmp(&other.minor) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.patch.cmp(&other.patch) {
            Ordering::Equal => {}
            ord => return ord,
        }

        // Compare prerelease (versions with prerelease are less than without)
        match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}
