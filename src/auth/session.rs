//! Sliding session cookies
//!
//! A session is the cookie pair `user=<username>` and
//! `authentication=<sha1(username ++ salt)>`. Every successful verification
//! pushes the expiry of both cookies to `now + duration`.

use crate::auth::{AuthError, SharedSecret, SharedSecretStore};
use sha1::{Digest, Sha1};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

/// Cookie carrying the plaintext username
pub const USER_COOKIE: &str = "user";
/// Cookie carrying the session token
pub const AUTH_COOKIE: &str = "authentication";
/// Default inactivity window in seconds
pub const DEFAULT_SESSION_DURATION: u64 = 600;

/// Compute the session token for `username`: lowercase hex SHA1 of
/// `username ++ salt`
pub fn session_token(username: &str, salt: &SharedSecret) -> String {
    let mut hasher = Sha1::new();
    hasher.update(username.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// The values to set on the client for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookies {
    pub user: String,
    pub authentication: String,
    /// Unix seconds; both cookies share it
    pub expires_at: u64,
}

impl SessionCookies {
    /// Empty cookies expiring at the epoch, which makes browsers drop them
    pub fn cleared() -> Self {
        Self {
            user: String::new(),
            authentication: String::new(),
            expires_at: 0,
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.user.is_empty() && self.authentication.is_empty()
    }
}

/// An authenticated session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub issued_at: u64,
    pub expires_at: u64,
    pub token: String,
}

impl Session {
    pub fn cookies(&self) -> SessionCookies {
        SessionCookies {
            user: self.username.clone(),
            authentication: self.token.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Issues and verifies session cookies against the shared salt
#[derive(Debug, Clone)]
pub struct SessionManager {
    secrets: Arc<SharedSecretStore>,
    duration: u64,
}

impl SessionManager {
    pub fn new(secrets: Arc<SharedSecretStore>, duration: u64) -> Self {
        Self { secrets, duration }
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Mint a session for a user whose credentials were already validated
    pub fn issue(&self, username: &str, now: u64) -> Result<Session, AuthError> {
        if username.is_empty() {
            return Err(AuthError::Validation("username is empty".to_string()));
        }

        let salt = self.secrets.session_salt()?;
        Ok(Session {
            username: username.to_string(),
            issued_at: now,
            expires_at: now.saturating_add(self.duration),
            token: session_token(username, salt),
        })
    }

    /// Revalidate the cookie pair and slide its expiry.
    ///
    /// Missing or empty cookies are a `Validation` error ("please log in"),
    /// a token mismatch is `Authentication`, and an unavailable salt is
    /// `Internal`.
    pub fn verify(
        &self,
        user: Option<&str>,
        authentication: Option<&str>,
        now: u64,
    ) -> Result<Session, AuthError> {
        let (user, supplied) = match (user, authentication) {
            (Some(u), Some(a)) if !u.is_empty() && !a.is_empty() => (u, a),
            _ => return Err(AuthError::Validation("please log in".to_string())),
        };

        let salt = self.secrets.session_salt()?;
        let expected = session_token(user, salt);

        if !bool::from(expected.as_bytes().ct_eq(supplied.as_bytes())) {
            debug!(username = %user, "Session token mismatch");
            return Err(AuthError::Authentication(
                "the supplied credentials don't match our stored values".to_string(),
            ));
        }

        Ok(Session {
            username: user.to_string(),
            issued_at: now,
            expires_at: now.saturating_add(self.duration),
            token: expected,
        })
    }

    /// Cookies that end the session
    pub fn clear(&self) -> SessionCookies {
        SessionCookies::cleared()
    }
}
