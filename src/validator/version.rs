//! Version constraints: `>=1.2`, `<2`, `!=1.4.1`, or a bare version meaning `==`.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use serde::Serialize;
use thiserror::Error;

use crate::error::CorewireError;

static LENIENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[vV]?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:[-+.]?([0-9A-Za-z.-]+))?$").unwrap()
});

/// An installed dependency does not satisfy its constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{name} requires {constraint}, found {found}")]
pub struct VersionConflict {
    pub name: String,
    pub constraint: String,
    pub found: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    Ge,
    Le,
    Eq,
    Ne,
    Gt,
    Lt,
}

impl ConstraintOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintOp::Ge => ">=",
            ConstraintOp::Le => "<=",
            ConstraintOp::Eq => "==",
            ConstraintOp::Ne => "!=",
            ConstraintOp::Gt => ">",
            ConstraintOp::Lt => "<",
        }
    }
}

/// A single comparison against a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pub op: ConstraintOp,
    pub version: Version,
}

impl VersionConstraint {
    pub fn matches(&self, found: &Version) -> bool {
        let ordering = cmp_release(found, &self.version);
        match self.op {
            ConstraintOp::Ge => ordering.is_ge(),
            ConstraintOp::Le => ordering.is_le(),
            ConstraintOp::Eq => ordering.is_eq(),
            ConstraintOp::Ne => ordering.is_ne(),
            ConstraintOp::Gt => ordering.is_gt(),
            ConstraintOp::Lt => ordering.is_lt(),
        }
    }

    /// Check `found` for dependency `name`.
    ///
    /// Returns `Ok(false)` when `found` is not a recognizable version.
    pub fn check(&self, name: &str, found: &str) -> Result<bool, VersionConflict> {
        let Some(version) = parse_lenient(found) else {
            return Ok(false);
        };
        if self.matches(&version) {
            Ok(true)
        } else {
            Err(VersionConflict {
                name: name.to_string(),
                constraint: self.to_string(),
                found: found.to_string(),
            })
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = CorewireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // Two-character operators first so `>=` is not read as `>`.
        let (op, rest) = [
            (">=", ConstraintOp::Ge),
            ("<=", ConstraintOp::Le),
            ("==", ConstraintOp::Eq),
            ("!=", ConstraintOp::Ne),
            (">", ConstraintOp::Gt),
            ("<", ConstraintOp::Lt),
            ("=", ConstraintOp::Eq),
        ]
        .iter()
        .find_map(|(prefix, op)| s.strip_prefix(prefix).map(|rest| (*op, rest)))
        .unwrap_or((ConstraintOp::Eq, s));

        let version = parse_lenient(rest.trim()).ok_or_else(|| {
            CorewireError::Manifest(format!("invalid version constraint '{}'", s))
        })?;
        Ok(Self { op, version })
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.version)
    }
}

/// Parse `1`, `1.2`, `v1.2.3`, `1.2.3rc1`, or full semver. Missing parts are zero.
pub fn parse_lenient(s: &str) -> Option<Version> {
    let s = s.trim();
    if let Ok(v) = Version::parse(s.trim_start_matches(['v', 'V'])) {
        return Some(v);
    }
    let caps = LENIENT_RE.captures(s)?;
    let part = |i: usize| -> Option<u64> {
        caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok())
    };
    Some(Version::new(part(1)?, part(2)?, part(3)?))
}

/// Compare on release numbers only, so build metadata and pre-release tags
/// do not make `1.2.3-rc1` fail `>=1.2`.
fn cmp_release(a: &Version, b: &Version) -> std::cmp::Ordering {
    (a.major, a.minor, a.patch).cmp(&(b.major, b.minor, b.patch))
}
