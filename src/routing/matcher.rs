//! Route matching logic.
//!
//! # Responsibilities
//! - Match host (exact, wildcard suffix, or any)
//! - Match path (exact, segment-aware prefix, or regex)
//! - Match header predicates (exact value or regex)
//!
//! # Design Decisions
//! - Host matching is case-insensitive (patterns are lowercased on parse)
//! - Path matching is case-sensitive
//! - Wildcard hosts match one or more leading labels
//! - Prefix matching respects `/` segment boundaries
//! - Patterns are parsed and compiled once, when the rule is built

use axum::http::{HeaderMap, HeaderName};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::routing::error::ValidationError;
use crate::routing::request::RouteRequest;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &RouteRequest) -> bool;
}

/// Host constraint of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostMatch {
    /// No host constraint (catch-all).
    Any,
    Exact(String),
    /// `*.example.com`, stored as the suffix `.example.com`.
    Wildcard { suffix: String },
}

impl HostMatch {
    /// Parse a host pattern. Empty and `*` mean "any host".
    pub fn parse(pattern: &str) -> Result<Self, ValidationError> {
        let normalized = pattern.trim().trim_end_matches('.').to_ascii_lowercase();
        if normalized.is_empty() || normalized == "*" {
            return Ok(Self::Any);
        }

        if let Some(rest) = normalized.strip_prefix("*.") {
            validate_hostname(rest, pattern)?;
            return Ok(Self::Wildcard {
                suffix: format!(".{rest}"),
            });
        }

        validate_hostname(&normalized, pattern)?;
        Ok(Self::Exact(normalized))
    }

    /// Match an already-normalized request host.
    pub fn matches_host(&self, host: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == host,
            Self::Wildcard { suffix } => host.len() > suffix.len() && host.ends_with(suffix.as_str()),
        }
    }
}

impl fmt::Display for HostMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(host) => f.write_str(host),
            Self::Wildcard { suffix } => write!(f, "*{suffix}"),
        }
    }
}

impl Matcher for HostMatch {
    fn matches(&self, req: &RouteRequest) -> bool {
        self.matches_host(req.host())
    }
}

fn validate_hostname(host: &str, pattern: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidHost {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if host.contains(':') {
        return Err(invalid("host patterns must not carry a port"));
    }
    if host.contains('*') {
        return Err(invalid("wildcard is only allowed as the leftmost label"));
    }
    for label in host.split('.') {
        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("labels must not start or end with '-'"));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(invalid("labels may only contain letters, digits and '-'"));
        }
    }
    Ok(())
}

/// Path match type, as declared in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    #[serde(alias = "Exact")]
    Exact,
    /// `ImplementationSpecific` is treated as a prefix, like the NGINX controller does.
    #[default]
    #[serde(alias = "Prefix", alias = "ImplementationSpecific")]
    Prefix,
    #[serde(alias = "Regex")]
    Regex,
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Exact => "exact",
            Self::Prefix => "prefix",
            Self::Regex => "regex",
        })
    }
}

/// Path constraint of a rule.
#[derive(Clone, Debug)]
pub enum PathMatch {
    Exact(String),
    /// Normalized: no trailing `/` unless the prefix is `/` itself.
    Prefix(String),
    Regex(Regex),
}

// === impl PathMatch ===

impl PartialEq for PathMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(l0), Self::Exact(r0)) => l0 == r0,
            (Self::Prefix(l0), Self::Prefix(r0)) => l0 == r0,
            (Self::Regex(l0), Self::Regex(r0)) => l0.as_str() == r0.as_str(),
            _ => false,
        }
    }
}

impl Eq for PathMatch {}

impl PathMatch {
    pub fn new(kind: PathKind, pattern: &str) -> Result<Self, ValidationError> {
        match kind {
            PathKind::Exact => Self::exact(pattern),
            PathKind::Prefix => Self::prefix(pattern),
            PathKind::Regex => Self::regex(pattern),
        }
    }

    pub fn exact(path: &str) -> Result<Self, ValidationError> {
        require_absolute(path)?;
        Ok(Self::Exact(path.to_string()))
    }

    pub fn prefix(path: &str) -> Result<Self, ValidationError> {
        require_absolute(path)?;
        let trimmed = path.trim_end_matches('/');
        let normalized = if trimmed.is_empty() { "/" } else { trimmed };
        Ok(Self::Prefix(normalized.to_string()))
    }

    pub fn regex(pattern: &str) -> Result<Self, ValidationError> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| ValidationError::InvalidPath {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn kind(&self) -> PathKind {
        match self {
            Self::Exact(_) => PathKind::Exact,
            Self::Prefix(_) => PathKind::Prefix,
            Self::Regex(_) => PathKind::Regex,
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            Self::Exact(path) | Self::Prefix(path) => path,
            Self::Regex(re) => re.as_str(),
        }
    }

    pub fn matches_path(&self, path: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == path,
            Self::Prefix(prefix) => {
                if prefix == "/" {
                    return true;
                }
                match path.strip_prefix(prefix.as_str()) {
                    Some(rest) => rest.is_empty() || rest.starts_with('/'),
                    None => false,
                }
            }
            Self::Regex(re) => re.is_match(path),
        }
    }

    pub fn specificity(&self) -> PathSpecificity {
        PathSpecificity {
            exact: matches!(self, Self::Exact(_)),
            length: self.pattern().len(),
            literal: !matches!(self, Self::Regex(_)),
        }
    }
}

impl Matcher for PathMatch {
    fn matches(&self, req: &RouteRequest) -> bool {
        self.matches_path(req.path())
    }
}

fn require_absolute(path: &str) -> Result<(), ValidationError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(ValidationError::InvalidPath {
            pattern: path.to_string(),
            reason: "path must start with '/'".to_string(),
        })
    }
}

/// How specific a path match is. Greater is more specific.
///
/// Fields compare in order: exact matches beat everything else, then longer
/// patterns beat shorter ones, then literal prefixes beat regexes of the same
/// length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PathSpecificity {
    pub exact: bool,
    pub length: usize,
    pub literal: bool,
}

/// Header predicate of a rule.
#[derive(Clone, Debug)]
pub enum HeaderMatch {
    Exact(HeaderName, String),
    Regex(HeaderName, Regex),
}

// === impl HeaderMatch ===

impl PartialEq for HeaderMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(n0, v0), Self::Exact(n1, v1)) => n0 == n1 && v0 == v1,
            (Self::Regex(n0, r0), Self::Regex(n1, r1)) => n0 == n1 && r0.as_str() == r1.as_str(),
            _ => false,
        }
    }
}

impl Eq for HeaderMatch {}

impl HeaderMatch {
    pub fn exact(name: &str, value: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self::Exact(parse_header_name(name)?, value.into()))
    }

    pub fn regex(name: &str, pattern: &str) -> Result<Self, ValidationError> {
        let name = parse_header_name(name)?;
        let re = Regex::new(pattern).map_err(|e| ValidationError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::Regex(name, re))
    }

    pub fn name(&self) -> &HeaderName {
        match self {
            Self::Exact(name, _) | Self::Regex(name, _) => name,
        }
    }

    /// True if any value of the named header satisfies the predicate.
    pub fn matches_headers(&self, headers: &HeaderMap) -> bool {
        headers.get_all(self.name()).iter().any(|value| match self {
            Self::Exact(_, expected) => value.as_bytes() == expected.as_bytes(),
            Self::Regex(_, re) => value.to_str().map(|v| re.is_match(v)).unwrap_or(false),
        })
    }
}

impl fmt::Display for HeaderMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(name, value) => write!(f, "{name}={value}"),
            Self::Regex(name, re) => write!(f, "{name}~{}", re.as_str()),
        }
    }
}

impl Matcher for HeaderMatch {
    fn matches(&self, req: &RouteRequest) -> bool {
        self.matches_headers(req.headers())
    }
}

fn parse_header_name(name: &str) -> Result<HeaderName, ValidationError> {
    HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| ValidationError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })
}
