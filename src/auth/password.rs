//! Stored password hashes
//!
//! `hash = md5(username "::" cleartext)` as 32 lowercase hex characters.
//! The username is the only salt, so the same credentials always hash to the
//! same value.

use md5::{Digest, Md5};
use std::fmt;

/// Separator between username and cleartext
pub const PASSWORD_SEPARATOR: &str = "::";

/// A password hash as stored in the account table
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Hash a cleartext password for `username`
    pub fn compute(username: &str, cleartext: &str) -> Self {
        let mut hasher = Md5::new();
        hasher.update(username.as_bytes());
        hasher.update(PASSWORD_SEPARATOR.as_bytes());
        hasher.update(cleartext.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an already computed hash (as read from storage)
    pub fn from_stored(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PasswordHash([REDACTED])")
    }
}
