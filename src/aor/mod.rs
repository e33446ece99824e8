//! Address-of-record parsing and wildcard matching
//!
//! An address of record is `user@host`. Candidate addresses may carry a
//! leading `sip:` or `sips:` scheme, which is stripped before matching.
//!
//! Patterns have the same shape, and either segment may be the literal `*`:
//! - `*@*` matches every address
//! - `alice@*` matches `alice` on any host
//! - `*@example.org` matches any user on `example.org`
//!
//! Matching contract: the user segment is compared case-sensitively, the
//! host segment ASCII case-insensitively.

use std::fmt;
use thiserror::Error;

/// The wildcard segment
pub const WILDCARD: &str = "*";

/// Characters that may never appear in an address or a pattern.
/// `:` is the ticket field separator.
fn is_forbidden_char(c: char) -> bool {
    c == ':' || c == '@' || c.is_whitespace() || c.is_control()
}

fn is_valid_segment(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(is_forbidden_char)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AorError {
    #[error("address cannot be empty")]
    Empty,

    #[error("address '{0}' must have the form user@host")]
    MissingAt(String),

    #[error("invalid user segment '{0}'")]
    InvalidUser(String),

    #[error("invalid host segment '{0}'")]
    InvalidHost(String),

    #[error("wildcard '*' is not allowed in a concrete address")]
    WildcardInAddress,
}

fn split_user_host(input: &str) -> Result<(&str, &str), AorError> {
    if input.is_empty() {
        return Err(AorError::Empty);
    }

    let (user, host) = input
        .split_once('@')
        .ok_or_else(|| AorError::MissingAt(input.to_string()))?;

    if !is_valid_segment(user) {
        return Err(AorError::InvalidUser(user.to_string()));
    }
    if !is_valid_segment(host) {
        return Err(AorError::InvalidHost(host.to_string()));
    }

    Ok((user, host))
}

/// A concrete address of record (no wildcards)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Aor {
    user: String,
    host: String,
}

impl Aor {
    /// Parse a candidate address, stripping an optional `sip:`/`sips:` scheme
    pub fn parse(input: &str) -> Result<Self, AorError> {
        let trimmed = input.trim();
        let bare = trimmed
            .strip_prefix("sips:")
            .or_else(|| trimmed.strip_prefix("sip:"))
            .unwrap_or(trimmed);

        let (user, host) = split_user_host(bare)?;

        if user == WILDCARD || host == WILDCARD {
            return Err(AorError::WildcardInAddress);
        }

        Ok(Self {
            user: user.to_string(),
            host: host.to_string(),
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl fmt::Display for Aor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}

/// One side of a pattern: either `*` or an exact value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Any,
    Exact(String),
}

impl Segment {
    fn parse(s: &str) -> Self {
        if s == WILDCARD {
            Segment::Any
        } else {
            Segment::Exact(s.to_string())
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Any => write!(f, "{}", WILDCARD),
            Segment::Exact(s) => write!(f, "{}", s),
        }
    }
}

/// A `user@host` pattern where either segment may be `*`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AorPattern {
    user: Segment,
    host: Segment,
}

impl AorPattern {
    /// Pattern matching every address
    pub fn any() -> Self {
        Self {
            user: Segment::Any,
            host: Segment::Any,
        }
    }

    /// Parse a pattern such as `alice@*` or `*@example.org`
    pub fn parse(pattern: &str) -> Result<Self, AorError> {
        let (user, host) = split_user_host(pattern)?;

        Ok(Self {
            user: Segment::parse(user),
            host: Segment::parse(host),
        })
    }

    /// Check if this pattern matches an address
    pub fn matches(&self, aor: &Aor) -> bool {
        let user_ok = match &self.user {
            Segment::Any => true,
            Segment::Exact(u) => *u == aor.user,
        };
        let host_ok = match &self.host {
            Segment::Any => true,
            Segment::Exact(h) => h.eq_ignore_ascii_case(&aor.host),
        };
        user_ok && host_ok
    }

    /// Parse `candidate` and match it; unparsable candidates never match
    pub fn matches_str(&self, candidate: &str) -> bool {
        Aor::parse(candidate)
            .map(|aor| self.matches(&aor))
            .unwrap_or(false)
    }

    /// True for `*@*`
    pub fn is_universal(&self) -> bool {
        self.user == Segment::Any && self.host == Segment::Any
    }
}

impl fmt::Display for AorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}
