//! Authentication error taxonomy

use crate::storage::StorageError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Every failure the auth subsystem can report.
///
/// The variants stay distinct all the way to the caller: an `Internal`
/// error must never be shown to a user as a credential mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Missing or malformed input the user can correct
    #[error("validation error: {0}")]
    Validation(String),

    /// Credentials or session token do not match
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Ticket scope does not cover the requested endpoints
    #[error("authorization error: {0}")]
    Authorization(String),

    /// Session or ticket outside its valid time window
    #[error("expired: {0}")]
    Expired(String),

    /// Secret unavailable or repository misbehaved
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification, used for status mapping and JSON output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorKind {
    Validation,
    Authentication,
    Authorization,
    Expired,
    Internal,
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::Validation(_) => AuthErrorKind::Validation,
            AuthError::Authentication(_) => AuthErrorKind::Authentication,
            AuthError::Authorization(_) => AuthErrorKind::Authorization,
            AuthError::Expired(_) => AuthErrorKind::Expired,
            AuthError::Internal(_) => AuthErrorKind::Internal,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, AuthError::Internal(_))
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorKind::Validation => write!(f, "validation"),
            AuthErrorKind::Authentication => write!(f, "authentication"),
            AuthErrorKind::Authorization => write!(f, "authorization"),
            AuthErrorKind::Expired => write!(f, "expired"),
            AuthErrorKind::Internal => write!(f, "internal"),
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::Internal(err.to_string())
    }
}
