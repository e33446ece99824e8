//! Callgate - token-based authentication for a WebSocket calling gateway
//!
//! Session cookies guard the account pages; HMAC-signed tickets guard the
//! WebSocket upgrade and scope it to the endpoints a client may call.

pub mod accounts;
pub mod aor;
pub mod auth;
pub mod server;
pub mod storage;

pub use accounts::{AccountService, AccountState, ActivationOutcome, CredentialCheck};
pub use aor::{Aor, AorPattern};
pub use auth::{AuthError, SessionManager, SharedSecretStore, TicketIssuer, TicketVerifier};
pub use server::CallgateServer;
