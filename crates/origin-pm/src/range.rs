//! Version ranges
//!
//! A range is parsed once into a list of comparators that must all hold. Every
//! supported syntax expands into plain comparators at parse time:
//!
//! | Syntax           | Expansion                          |
//! |------------------|------------------------------------|
//! | `*`, `""`        | (no comparators, matches anything) |
//! | `1.2.3`          | `>=1.2.3 <1.2.4`                   |
//! | `^1.2.3`         | `>=1.2.3 <2.0.0`                   |
//! | `^0.2.3`         | `>=0.2.3 <0.3.0`                   |
//! | `^0.0.3`         | `>=0.0.3 <0.0.4`                   |
//! | `~1.2.3`         | `>=1.2.3 <1.3.0`                   |
//! | `1.*`, `1.x`     | `>=1.0.0 <2.0.0`                   |
//! | `1.2.*`, `1.2.x` | `>=1.2.0 <1.3.0`                   |
//! | `>=1.0.0 <2.0.0` | both comparators                   |
//!
//! Because a conjunction of comparators is always a single interval, two ranges
//! are compatible exactly when the intersection of their intervals is
//! non-empty. [`ranges_intersect`] performs that check.

use crate::semver::{SemverError, Version};
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a single comparator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `>=`
    GreaterThanOrEqual,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `<`
    LessThan,
    /// `=`
    Exact,
}

impl Op {
    /// Operator prefixes, longest first so `>=` wins over `>`
    const PREFIXES: [(&'static str, Op); 5] = [
        (">=", Op::GreaterThanOrEqual),
        ("<=", Op::LessThanOrEqual),
        (">", Op::GreaterThan),
        ("<", Op::LessThan),
        ("=", Op::Exact),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Op::GreaterThanOrEqual => ">=",
            Op::LessThanOrEqual => "<=",
            Op::GreaterThan => ">",
            Op::LessThan => "<",
            Op::Exact => "=",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(operator, version)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    pub op: Op,
    pub version: Version,
}

impl Comparator {
    pub fn new(op: Op, version: Version) -> Self {
        Self { op, version }
    }

    /// Check whether `version` satisfies this comparator
    pub fn matches(&self, version: &Version) -> bool {
        match self.op {
            Op::GreaterThanOrEqual => version >= &self.version,
            Op::LessThanOrEqual => version <= &self.version,
            Op::GreaterThan => version > &self.version,
            Op::LessThan => version < &self.version,
            Op::Exact => version == &self.version,
        }
    }

    /// The set of versions accepted by this comparator
    pub fn interval(&self) -> Interval {
        let v = self.version.clone();
        match self.op {
            Op::GreaterThanOrEqual => Interval::at_least(Bound::inclusive(v)),
            Op::GreaterThan => Interval::at_least(Bound::exclusive(v)),
            Op::LessThanOrEqual => Interval::at_most(Bound::inclusive(v)),
            Op::LessThan => Interval::at_most(Bound::exclusive(v)),
            Op::Exact => Interval {
                lower: Some(Bound::inclusive(v.clone())),
                upper: Some(Bound::inclusive(v)),
            },
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.version)
    }
}

/// A parsed version range: all comparators must hold
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionRange {
    comparators: Vec<Comparator>,
}

impl VersionRange {
    /// Parse a range expression
    ///
    /// Whitespace separates independent tokens which are ANDed together. Any
    /// malformed token, or a compound whose comparators can never hold at the
    /// same time, fails the whole range.
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        let mut comparators = Vec::new();

        for token in s.split_whitespace() {
            parse_token(token, &mut comparators).map_err(|_| {
                SemverError::InvalidRange(format!("invalid token '{}' in '{}'", token, s.trim()))
            })?;
        }

        let range = VersionRange { comparators };
        if range.interval().is_empty() {
            return Err(SemverError::InvalidRange(format!(
                "'{}' can never be satisfied",
                s.trim()
            )));
        }

        Ok(range)
    }

    /// Comparators in the order they were written
    pub fn comparators(&self) -> &[Comparator] {
        &self.comparators
    }

    /// True for `*` and the empty range
    pub fn is_any(&self) -> bool {
        self.comparators.is_empty()
    }

    /// Check whether `version` satisfies every comparator
    pub fn satisfies(&self, version: &Version) -> bool {
        self.comparators.iter().all(|c| c.matches(version))
    }

    /// Reduce the comparator list to the single interval it describes
    pub fn interval(&self) -> Interval {
        self.comparators
            .iter()
            .fold(Interval::full(), |acc, c| acc.intersect(&c.interval()))
    }
}

/// Parse one whitespace-free token, appending its comparators
fn parse_token(token: &str, out: &mut Vec<Comparator>) -> Result<(), SemverError> {
    if matches!(token, "*" | "x" | "X") {
        return Ok(());
    }

    if let Some(rest) = token.strip_prefix('^') {
        let v = Version::parse(rest)?;
        let upper = if v.major > 0 {
            v.bump_major()
        } else if v.minor > 0 {
            v.bump_minor()
        } else {
            v.bump_patch()
        };
        push_span(out, v, upper);
        return Ok(());
    }

    if let Some(rest) = token.strip_prefix('~') {
        let v = Version::parse(rest)?;
        let upper = v.bump_minor();
        push_span(out, v, upper);
        return Ok(());
    }

    for (prefix, op) in Op::PREFIXES {
        if let Some(rest) = token.strip_prefix(prefix) {
            out.push(Comparator::new(op, Version::parse(rest)?));
            return Ok(());
        }
    }

    if let Some((lower, upper)) = parse_wildcard(token) {
        push_span(out, lower, upper);
        return Ok(());
    }

    // Bare version: pins exactly that patch
    let v = Version::parse(token)?;
    let upper = v.bump_patch();
    push_span(out, v, upper);
    Ok(())
}

/// Append `>=lower <upper`; an upper bound past `u64::MAX` leaves the span open
fn push_span(out: &mut Vec<Comparator>, lower: Version, upper: Option<Version>) {
    out.push(Comparator::new(Op::GreaterThanOrEqual, lower));
    if let Some(upper) = upper {
        out.push(Comparator::new(Op::LessThan, upper));
    }
}

/// Parse `1.*`, `1.x`, `1.2.*`, `1.2.x` into `lower` and an exclusive upper bound
fn parse_wildcard(token: &str) -> Option<(Version, Option<Version>)> {
    let is_wild = |p: &str| matches!(p, "*" | "x" | "X");
    let number = |p: &str| -> Option<u64> {
        if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        p.parse().ok()
    };

    let parts: Vec<&str> = token.split('.').collect();
    match parts.as_slice() {
        [major, rest @ ..] if !rest.is_empty() && rest.iter().all(|p| is_wild(p)) && rest.len() <= 2 => {
            let lower = Version::new(number(major)?, 0, 0);
            let upper = lower.bump_major();
            Some((lower, upper))
        }
        [major, minor, patch] if is_wild(patch) => {
            let lower = Version::new(number(major)?, number(minor)?, 0);
            let upper = lower.bump_minor();
            Some((lower, upper))
        }
        _ => None,
    }
}

impl FromStr for VersionRange {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionRange::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.comparators.is_empty() {
            return f.write_str("*");
        }
        for (i, c) in self.comparators.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// One end of an [`Interval`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

impl Bound {
    pub fn inclusive(version: Version) -> Self {
        Self {
            version,
            inclusive: true,
        }
    }

    pub fn exclusive(version: Version) -> Self {
        Self {
            version,
            inclusive: false,
        }
    }
}

/// A contiguous set of versions; `None` bounds are unbounded
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Interval {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

impl Interval {
    /// Every version
    pub fn full() -> Self {
        Self::default()
    }

    pub fn at_least(lower: Bound) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
        }
    }

    pub fn at_most(upper: Bound) -> Self {
        Self {
            lower: None,
            upper: Some(upper),
        }
    }

    /// The set of versions contained in both intervals
    pub fn intersect(&self, other: &Interval) -> Interval {
        let lower = match (&self.lower, &other.lower) {
            (Some(a), Some(b)) => Some(tighter_lower(a, b).clone()),
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        let upper = match (&self.upper, &other.upper) {
            (Some(a), Some(b)) => Some(tighter_upper(a, b).clone()),
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        Interval { lower, upper }
    }

    /// True when no version can lie inside the interval
    ///
    /// Versions are treated as a dense order: `>1.0.0 <1.0.1` is non-empty
    /// because `1.0.1-0` lies between the bounds.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(lo), Some(hi)) => match lo.version.cmp(&hi.version) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Equal => !(lo.inclusive && hi.inclusive),
                std::cmp::Ordering::Less => false,
            },
            _ => false,
        }
    }
}

fn tighter_lower<'a>(a: &'a Bound, b: &'a Bound) -> &'a Bound {
    match a.version.cmp(&b.version) {
        std::cmp::Ordering::Greater => a,
        std::cmp::Ordering::Less => b,
        std::cmp::Ordering::Equal if !a.inclusive => a,
        std::cmp::Ordering::Equal => b,
    }
}

fn tighter_upper<'a>(a: &'a Bound, b: &'a Bound) -> &'a Bound {
    match a.version.cmp(&b.version) {
        std::cmp::Ordering::Less => a,
        std::cmp::Ordering::Greater => b,
        std::cmp::Ordering::Equal if !a.inclusive => a,
        std::cmp::Ordering::Equal => b,
    }
}

/// Check whether a single version could satisfy every range at once
pub fn ranges_intersect(ranges: &[VersionRange]) -> bool {
    !ranges
        .iter()
        .fold(Interval::full(), |acc, r| acc.intersect(&r.interval()))
        .is_empty()
}

/// Find the highest version in `versions` that satisfies `range`
///
/// Entries that are not valid versions are skipped. An invalid `range` is an
/// error because it is caller-supplied.
pub fn find_highest_compatible<'a, I>(versions: I, range: &str) -> Result<Option<Version>, SemverError>
where
    I: IntoIterator<Item = &'a str>,
{
    let range = VersionRange::parse(range)?;
    Ok(versions
        .into_iter()
        .filter_map(|v| Version::parse(v).ok())
        .filter(|v| range.satisfies(v))
        .max())
}
