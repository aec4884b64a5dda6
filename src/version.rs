//! # Semantic Versions and Constraints
//!
//! Parsing, precedence comparison and range satisfaction for the versions
//! attached to components and symbols.
//!
//! ## Grammar
//!
//! A version is `MAJOR.MINOR.PATCH[-prerelease][+build]`, parsed strictly by
//! the `semver` crate. The strings `*` and `latest` parse to the wildcard
//! version, which compares equal only to another wildcard and below every
//! concrete version.
//!
//! A constraint is an optional operator followed by a version:
//!
//! | Operator | Meaning |
//! |----------|---------|
//! | `=` (or none) | exact precedence match |
//! | `<`, `<=`, `>`, `>=` | ordered comparison |
//! | `^C` | same major as `C` and not below `C`; for `0.x` the minor is pinned too |
//! | `~C` | same major and minor as `C`, patch not below `C.patch` |
//! | `*`, `latest`, `any`, empty | always satisfied |
//!
//! Ordering follows SemVer precedence: a prerelease ranks below the release
//! with the same core version, and build metadata never affects ordering.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A component or symbol version, or the wildcard that stands for "any".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SemanticVersion {
    /// `*` or `latest`
    Wildcard,
    /// A concrete `MAJOR.MINOR.PATCH[-pre][+build]` version
    Release(semver::Version),
}

impl SemanticVersion {
    /// Build a plain release version without prerelease or build metadata.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        SemanticVersion::Release(semver::Version::new(major, minor, patch))
    }

    /// Parse a version string; see the module docs for the grammar.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed == "*" || trimmed == "latest" {
            return Ok(SemanticVersion::Wildcard);
        }
        semver::Version::parse(trimmed)
            .map(SemanticVersion::Release)
            .map_err(|e| Error::invalid_input(input, e.to_string()))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, SemanticVersion::Wildcard)
    }

    /// The concrete version, if this is not the wildcard.
    pub fn as_release(&self) -> Option<&semver::Version> {
        match self {
            SemanticVersion::Wildcard => None,
            SemanticVersion::Release(v) => Some(v),
        }
    }

    /// Precedence comparison.
    ///
    /// Build metadata is ignored, so two versions that differ only in their
    /// build suffix compare `Equal` even though they are not `==`.
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SemanticVersion::Wildcard, SemanticVersion::Wildcard) => Ordering::Equal,
            (SemanticVersion::Wildcard, SemanticVersion::Release(_)) => Ordering::Less,
            (SemanticVersion::Release(_), SemanticVersion::Wildcard) => Ordering::Greater,
            (SemanticVersion::Release(a), SemanticVersion::Release(b)) => a.cmp_precedence(b),
        }
    }

    /// Whether this version satisfies `constraint`.
    pub fn satisfies(&self, constraint: &VersionConstraint) -> bool {
        constraint.matches(self)
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticVersion::Wildcard => write!(f, "*"),
            SemanticVersion::Release(v) => write!(f, "{}", v),
        }
    }
}

impl FromStr for SemanticVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SemanticVersion::parse(s)
    }
}

/// Comparison operator of a [`VersionConstraint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Exact,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Caret,
    Tilde,
    Any,
}

impl Operator {
    fn symbol(self) -> &'static str {
        match self {
            Operator::Exact => "=",
            Operator::Less => "<",
            Operator::LessEq => "<=",
            Operator::Greater => ">",
            Operator::GreaterEq => ">=",
            Operator::Caret => "^",
            Operator::Tilde => "~",
            Operator::Any => "*",
        }
    }
}

// Two-character operators must be tried before their one-character prefixes.
const OPERATORS: [(&str, Operator); 7] = [
    (">=", Operator::GreaterEq),
    ("<=", Operator::LessEq),
    (">", Operator::Greater),
    ("<", Operator::Less),
    ("=", Operator::Exact),
    ("^", Operator::Caret),
    ("~", Operator::Tilde),
];

/// A single version requirement such as `^1.2.0` or `<2.0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionConstraint {
    pub op: Operator,
    pub version: SemanticVersion,
}

impl VersionConstraint {
    /// The constraint every version satisfies.
    pub fn any() -> Self {
        Self {
            op: Operator::Any,
            version: SemanticVersion::Wildcard,
        }
    }

    pub fn new(op: Operator, version: SemanticVersion) -> Self {
        if op == Operator::Any || version.is_wildcard() {
            return Self::any();
        }
        Self { op, version }
    }

    /// Parse a constraint string; see the module docs for the grammar.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "any" || trimmed == "*" || trimmed == "latest" {
            return Ok(Self::any());
        }

        let (op, rest) = OPERATORS
            .iter()
            .find_map(|(prefix, op)| trimmed.strip_prefix(prefix).map(|rest| (*op, rest)))
            .unwrap_or((Operator::Exact, trimmed));

        let version = SemanticVersion::parse(rest).map_err(|e| match e {
            Error::InvalidInput { message, .. } => Error::invalid_input(input, message),
            other => other,
        })?;
        Ok(Self::new(op, version))
    }

    pub fn is_any(&self) -> bool {
        self.op == Operator::Any
    }

    /// Whether `version` satisfies this constraint.
    ///
    /// A wildcard version only satisfies the `any` constraint.
    pub fn matches(&self, version: &SemanticVersion) -> bool {
        if self.op == Operator::Any {
            return true;
        }
        let (Some(v), Some(c)) = (version.as_release(), self.version.as_release()) else {
            return false;
        };
        let cmp = v.cmp_precedence(c);
        match self.op {
            Operator::Exact => cmp == Ordering::Equal,
            Operator::Less => cmp == Ordering::Less,
            Operator::LessEq => cmp != Ordering::Greater,
            Operator::Greater => cmp == Ordering::Greater,
            Operator::GreaterEq => cmp != Ordering::Less,
            Operator::Caret => {
                v.major == c.major && (c.major != 0 || v.minor == c.minor) && cmp != Ordering::Less
            }
            Operator::Tilde => v.major == c.major && v.minor == c.minor && cmp != Ordering::Less,
            Operator::Any => true,
        }
    }
}

impl Default for VersionConstraint {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Operator::Any => write!(f, "*"),
            op => write!(f, "{}{}", op.symbol(), self.version),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        VersionConstraint::parse(s)
    }
}

/// Parse a version string.
pub fn parse(input: &str) -> Result<SemanticVersion> {
    SemanticVersion::parse(input)
}

/// Compare two versions by SemVer precedence.
pub fn compare(a: &SemanticVersion, b: &SemanticVersion) -> Ordering {
    a.compare(b)
}

/// Check a version against a constraint.
pub fn satisfies(version: &SemanticVersion, constraint: &VersionConstraint) -> bool {
    constraint.matches(version)
}

/// String form of [`satisfies`]; malformed input is an error, never `false`.
pub fn satisfies_str(version: &str, constraint: &str) -> Result<bool> {
    Ok(satisfies(&parse(version)?, &VersionConstraint::parse(constraint)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> SemanticVersion {
        SemanticVersion::parse(s).unwrap()
    }

    #[test]
    fn test_parse_full_version() {
        let version = v("1.2.3-beta.1+build.5");
        let release = version.as_release().unwrap();
        assert_eq!(release.major, 1);
        assert_eq!(release.minor, 2);
        assert_eq!(release.patch, 3);
        assert_eq!(release.pre.as_str(), "beta.1");
        assert_eq!(release.build.as_str(), "build.5");
        assert_eq!(version.to_string(), "1.2.3-beta.1+build.5");
    }

    #[test]
    fn test_parse_wildcards() {
        assert!(v("*").is_wildcard());
        assert!(v("latest").is_wildcard());
        assert_eq!(v("*").to_string(), "*");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "1", "1.2", "1.x.3", "a.b.c", "1.2.3.4", "01.2.3"] {
            let err = SemanticVersion::parse(bad).unwrap_err();
            assert!(
                matches!(err, Error::InvalidInput { .. }),
                "expected InvalidInput for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_compare_core_numbers() {
        assert_eq!(compare(&v("1.2.3"), &v("1.2.4")), Ordering::Less);
        assert_eq!(compare(&v("1.10.0"), &v("1.9.9")), Ordering::Greater);
        assert_eq!(compare(&v("2.0.0"), &v("2.0.0")), Ordering::Equal);
    }

    #[test]
    fn test_compare_prerelease_below_release() {
        assert_eq!(compare(&v("1.0.0-alpha"), &v("1.0.0")), Ordering::Less);
        assert_eq!(compare(&v("1.0.0"), &v("1.0.0-rc.1")), Ordering::Greater);
        assert_eq!(compare(&v("1.0.0-alpha"), &v("1.0.0-beta")), Ordering::Less);
        assert_eq!(compare(&v("1.0.0-alpha.2"), &v("1.0.0-alpha.10")), Ordering::Less);
    }

    #[test]
    fn test_compare_ignores_build_metadata() {
        assert_eq!(compare(&v("1.0.0+a"), &v("1.0.0+b")), Ordering::Equal);
        assert_ne!(v("1.0.0+a"), v("1.0.0+b"));
    }

    #[test]
    fn test_compare_wildcard() {
        assert_eq!(compare(&v("*"), &v("latest")), Ordering::Equal);
        assert_eq!(compare(&v("*"), &v("0.0.0")), Ordering::Less);
        assert_eq!(compare(&v("0.0.1"), &v("*")), Ordering::Greater);
    }

    #[test]
    fn test_satisfies_documented_examples() {
        assert!(satisfies_str("1.2.3", "^1.0.0").unwrap());
        assert!(!satisfies_str("2.0.0", "^1.0.0").unwrap());
        assert!(satisfies_str("1.2.5", "~1.2.0").unwrap());
        assert!(!satisfies_str("1.3.0", "~1.2.0").unwrap());
    }

    #[test]
    fn test_satisfies_caret_zero_major_pins_minor() {
        assert!(satisfies_str("0.2.5", "^0.2.3").unwrap());
        assert!(!satisfies_str("0.3.0", "^0.2.3").unwrap());
        assert!(!satisfies_str("0.2.2", "^0.2.3").unwrap());
    }

    #[test]
    fn test_satisfies_ordered_operators() {
        assert!(satisfies_str("1.0.0", "=1.0.0").unwrap());
        assert!(satisfies_str("1.0.0", "1.0.0").unwrap());
        assert!(!satisfies_str("1.0.1", "=1.0.0").unwrap());
        assert!(satisfies_str("0.9.9", "<1.0.0").unwrap());
        assert!(satisfies_str("1.0.0", "<=1.0.0").unwrap());
        assert!(satisfies_str("1.0.1", ">1.0.0").unwrap());
        assert!(!satisfies_str("1.0.0", ">1.0.0").unwrap());
        assert!(satisfies_str("1.0.0", ">=1.0.0").unwrap());
        assert!(satisfies_str("1.0.0-rc.1", "<1.0.0").unwrap());
    }

    #[test]
    fn test_satisfies_any() {
        for c in ["", "*", "latest", "any"] {
            assert!(satisfies_str("3.1.4", c).unwrap());
            assert!(satisfies_str("*", c).unwrap());
        }
    }

    #[test]
    fn test_wildcard_version_only_satisfies_any() {
        assert!(!satisfies_str("*", "<1.0.0").unwrap());
        assert!(!satisfies_str("*", "^1.0.0").unwrap());
    }

    #[test]
    fn test_constraint_parse_and_display() {
        let c = VersionConstraint::parse(">= 1.4.0").unwrap();
        assert_eq!(c.op, Operator::GreaterEq);
        assert_eq!(c.to_string(), ">=1.4.0");
        assert_eq!(VersionConstraint::parse("^2.0.0").unwrap().to_string(), "^2.0.0");
        assert!(VersionConstraint::parse("=*").unwrap().is_any());
        assert_eq!(VersionConstraint::any().to_string(), "*");
    }

    #[test]
    fn test_constraint_parse_rejects_malformed() {
        let err = VersionConstraint::parse("^1.x").unwrap_err();
        match err {
            Error::InvalidInput { input, .. } => assert_eq!(input, "^1.x"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(VersionConstraint::parse("!1.0.0").is_err());
        assert!(satisfies_str("1.0", "^1.0.0").is_err());
    }
}
