//! Deployment-wide shared secrets
//!
//! Two independent values: the salt mixed into session tokens and the key
//! for WebSocket ticket MACs. Both are loaded once at startup and handed to
//! the issuers/verifiers; nothing here mutates them afterwards.

use crate::auth::AuthError;
use std::fmt;

/// Environment variable holding the session salt
pub const SESSION_SALT_ENV: &str = "CALLGATE_SESSION_SALT";
/// Environment variable holding the WebSocket ticket secret
pub const TICKET_SECRET_ENV: &str = "CALLGATE_WS_SECRET";

/// A secret value. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret {
    value: Vec<u8>,
}

impl SharedSecret {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Read from an environment variable; empty values count as unset
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .filter(|v| !v.is_empty())
            .map(Self::new)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret([REDACTED])")
    }
}

/// Process-wide secret holder.
///
/// A missing secret is a deployment fault: lookups report it as
/// [`AuthError::Internal`], never as a credential failure.
#[derive(Debug, Clone, Default)]
pub struct SharedSecretStore {
    session_salt: Option<SharedSecret>,
    ticket_secret: Option<SharedSecret>,
}

impl SharedSecretStore {
    pub fn new(session_salt: Option<SharedSecret>, ticket_secret: Option<SharedSecret>) -> Self {
        Self {
            session_salt: session_salt.filter(|s| !s.is_empty()),
            ticket_secret: ticket_secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            SharedSecret::from_env(SESSION_SALT_ENV),
            SharedSecret::from_env(TICKET_SECRET_ENV),
        )
    }

    pub fn session_salt(&self) -> Result<&SharedSecret, AuthError> {
        self.session_salt
            .as_ref()
            .ok_or_else(|| AuthError::Internal("session salt is not configured".to_string()))
    }

    pub fn ticket_secret(&self) -> Result<&SharedSecret, AuthError> {
        self.ticket_secret
            .as_ref()
            .ok_or_else(|| AuthError::Internal("ticket secret is not configured".to_string()))
    }

    pub fn has_session_salt(&self) -> bool {
        self.session_salt.is_some()
    }

    pub fn has_ticket_secret(&self) -> bool {
        self.ticket_secret.is_some()
    }
}
