//! WebSocket admission tickets
//!
//! A ticket is three values, usually carried as cookies:
//! - `WSSessionInfo`: `version:issued_at:ttl:from_pattern:to_pattern`
//! - `WSSessionExtra`: optional opaque string
//! - `WSSessionMAC`: lowercase hex `HMAC-SHA1(secret, info[:extra])`
//!
//! Verification is stateless. A ticket stays valid for every presentation
//! inside `[issued_at, issued_at + ttl)`; there is no replay tracking.

use crate::aor::AorPattern;
use crate::auth::{AuthError, SharedSecret, SharedSecretStore};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::fmt;
use subtle::ConstantTimeEq;

/// The only payload version understood
pub const TICKET_VERSION: u32 = 1;

pub const INFO_COOKIE: &str = "WSSessionInfo";
pub const EXTRA_COOKIE: &str = "WSSessionExtra";
pub const MAC_COOKIE: &str = "WSSessionMAC";

const FIELD_SEPARATOR: char = ':';
const FIELD_COUNT: usize = 5;

type HmacSha1 = Hmac<Sha1>;

/// Why a ticket was turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// MAC does not match the payload
    Forged,
    /// Payload passed the MAC check but cannot be parsed
    Malformed(String),
    /// `now` is outside `[issued_at, issued_at + ttl)`
    Expired,
    /// A candidate address is not covered by the ticket's patterns
    ScopeViolation,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Forged => write!(f, "tamper/forged"),
            RejectReason::Malformed(detail) => write!(f, "malformed: {}", detail),
            RejectReason::Expired => write!(f, "expired"),
            RejectReason::ScopeViolation => write!(f, "scope violation"),
        }
    }
}

impl From<RejectReason> for AuthError {
    fn from(reason: RejectReason) -> Self {
        let msg = reason.to_string();
        match reason {
            RejectReason::Forged => AuthError::Authentication(msg),
            RejectReason::Malformed(_) => AuthError::Validation(msg),
            RejectReason::Expired => AuthError::Expired(msg),
            RejectReason::ScopeViolation => AuthError::Authorization(msg),
        }
    }
}

/// The signed part of a ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketPayload {
    pub version: u32,
    pub issued_at: u64,
    pub ttl: u64,
    pub from: AorPattern,
    pub to: AorPattern,
}

impl TicketPayload {
    /// Canonical `version:issued_at:ttl:from:to` form
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.version, self.issued_at, self.ttl, self.from, self.to
        )
    }

    pub fn parse(info: &str) -> Result<Self, RejectReason> {
        let fields: Vec<&str> = info.split(FIELD_SEPARATOR).collect();
        if fields.len() != FIELD_COUNT {
            return Err(RejectReason::Malformed(format!(
                "expected {} fields, got {}",
                FIELD_COUNT,
                fields.len()
            )));
        }

        let version: u32 = fields[0]
            .parse()
            .map_err(|_| RejectReason::Malformed(format!("bad version '{}'", fields[0])))?;
        if version != TICKET_VERSION {
            return Err(RejectReason::Malformed(format!(
                "unsupported version {}",
                version
            )));
        }

        let issued_at: u64 = fields[1]
            .parse()
            .map_err(|_| RejectReason::Malformed(format!("bad issue time '{}'", fields[1])))?;
        let ttl: u64 = fields[2]
            .parse()
            .map_err(|_| RejectReason::Malformed(format!("bad ttl '{}'", fields[2])))?;
        let from = AorPattern::parse(fields[3])
            .map_err(|e| RejectReason::Malformed(format!("from pattern: {}", e)))?;
        let to = AorPattern::parse(fields[4])
            .map_err(|e| RejectReason::Malformed(format!("to pattern: {}", e)))?;

        Ok(Self {
            version,
            issued_at,
            ttl,
            from,
            to,
        })
    }

    /// First second at which the ticket is no longer valid
    pub fn expires_at(&self) -> u64 {
        self.issued_at.saturating_add(self.ttl)
    }

    pub fn is_valid_at(&self, now: u64) -> bool {
        now >= self.issued_at && now < self.expires_at()
    }

    /// Both candidates must match their patterns
    pub fn covers(&self, from: &str, to: &str) -> bool {
        self.from.matches_str(from) && self.to.matches_str(to)
    }
}

impl fmt::Display for TicketPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// An issued ticket, ready to hand to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub payload: TicketPayload,
    /// Encoded payload exactly as signed
    pub info: String,
    pub extra: Option<String>,
    /// Lowercase hex MAC
    pub mac: String,
}

impl Ticket {
    pub fn expires_at(&self) -> u64 {
        self.payload.expires_at()
    }
}

/// Outcome handed to the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketVerdict {
    Admitted(TicketPayload),
    Rejected(RejectReason),
}

impl TicketVerdict {
    pub fn admitted(&self) -> bool {
        matches!(self, TicketVerdict::Admitted(_))
    }

    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            TicketVerdict::Admitted(_) => None,
            TicketVerdict::Rejected(reason) => Some(reason),
        }
    }
}

fn normalize_extra(extra: Option<&str>) -> Option<&str> {
    extra.filter(|e| !e.is_empty())
}

/// MAC over `info`, or over `info:extra` when an extra value is present
pub fn compute_mac(secret: &SharedSecret, info: &str, extra: Option<&str>) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(info.as_bytes());
    if let Some(extra) = normalize_extra(extra) {
        mac.update(&[FIELD_SEPARATOR as u8]);
        mac.update(extra.as_bytes());
    }
    hex::encode(mac.finalize().into_bytes())
}

/// Mints tickets with the ticket secret
#[derive(Debug, Clone)]
pub struct TicketIssuer {
    secret: SharedSecret,
}

impl TicketIssuer {
    pub fn new(secret: SharedSecret) -> Self {
        Self { secret }
    }

    pub fn from_store(secrets: &SharedSecretStore) -> Result<Self, AuthError> {
        Ok(Self::new(secrets.ticket_secret()?.clone()))
    }

    pub fn issue(
        &self,
        from: AorPattern,
        to: AorPattern,
        ttl: u64,
        extra: Option<&str>,
        now: u64,
    ) -> Result<Ticket, AuthError> {
        if ttl == 0 {
            return Err(AuthError::Validation("ticket ttl must be positive".to_string()));
        }

        let payload = TicketPayload {
            version: TICKET_VERSION,
            issued_at: now,
            ttl,
            from,
            to,
        };
        let info = payload.encode();
        let extra = normalize_extra(extra).map(str::to_string);
        let mac = compute_mac(&self.secret, &info, extra.as_deref());

        Ok(Ticket {
            payload,
            info,
            extra,
            mac,
        })
    }
}

/// Checks tickets presented on WebSocket upgrade
#[derive(Debug, Clone)]
pub struct TicketVerifier {
    secret: SharedSecret,
}

impl TicketVerifier {
    pub fn new(secret: SharedSecret) -> Self {
        Self { secret }
    }

    pub fn from_store(secrets: &SharedSecretStore) -> Result<Self, AuthError> {
        Ok(Self::new(secrets.ticket_secret()?.clone()))
    }

    /// Check MAC, then format, then time window, then scope
    pub fn verify(
        &self,
        info: &str,
        extra: Option<&str>,
        mac: &str,
        candidate_from: &str,
        candidate_to: &str,
        now: u64,
    ) -> TicketVerdict {
        let expected = compute_mac(&self.secret, info, extra);
        if !bool::from(expected.as_bytes().ct_eq(mac.as_bytes())) {
            return TicketVerdict::Rejected(RejectReason::Forged);
        }

        let payload = match TicketPayload::parse(info) {
            Ok(p) => p,
            Err(reason) => return TicketVerdict::Rejected(reason),
        };

        if !payload.is_valid_at(now) {
            return TicketVerdict::Rejected(RejectReason::Expired);
        }

        if !payload.covers(candidate_from, candidate_to) {
            return TicketVerdict::Rejected(RejectReason::ScopeViolation);
        }

        TicketVerdict::Admitted(payload)
    }
}
