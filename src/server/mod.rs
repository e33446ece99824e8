//! Callgate gateway server
//!
//! Serves the login/session pages and the ticket-guarded WebSocket endpoint.

mod connections;
pub mod cookies;
mod gateway;
mod web;
pub mod websocket;

pub use connections::{AdmittedSession, SessionRegistry};
pub use cookies::{CookieAttributes, CookieJar};
pub use gateway::{create_router, CallgateServer, CallgateServerConfig, GatewayState};
pub use web::status_for;
pub use websocket::{admit, upgrade_status, ClientMessage, ServerMessage};
