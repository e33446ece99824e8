//! Authentication and authorization
//!
//! Two independent mechanisms:
//! - Session cookies: `user` + `authentication = sha1(user ++ salt)`, sliding expiry
//! - WebSocket tickets: HMAC-SHA1 signed, time-bounded, scoped by from/to
//!   address patterns
//!
//! Each mechanism has its own shared secret in [`SharedSecretStore`].

mod error;
mod login;
mod password;
mod secret;
mod session;
pub mod ticket;

pub use error::{AuthError, AuthErrorKind};
pub use login::{AuthResult, Credentials, LoginFlow};
pub use password::{PasswordHash, PASSWORD_SEPARATOR};
pub use secret::{SharedSecret, SharedSecretStore, SESSION_SALT_ENV, TICKET_SECRET_ENV};
pub use session::{
    session_token, Session, SessionCookies, SessionManager, AUTH_COOKIE, DEFAULT_SESSION_DURATION,
    USER_COOKIE,
};
pub use ticket::{RejectReason, Ticket, TicketIssuer, TicketPayload, TicketVerdict, TicketVerifier};

/// Current wall-clock time in Unix seconds
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
