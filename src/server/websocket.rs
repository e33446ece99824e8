//! Ticket-guarded WebSocket endpoint
//!
//! The upgrade request must carry the ticket cookies and name the call
//! endpoints as `?from=...&to=...`. Malformed or missing tickets get 400,
//! forged, expired or out-of-scope tickets get 403. Each `call` on an open
//! socket is checked again against the ticket's scope and validity window.

use crate::aor::Aor;
use crate::auth::ticket::{EXTRA_COOKIE, INFO_COOKIE, MAC_COOKIE};
use crate::auth::{unix_now, AuthError, TicketPayload, TicketVerdict, TicketVerifier};
use crate::server::connections::AdmittedSession;
use crate::server::cookies::CookieJar;
use crate::server::gateway::GatewayState;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Messages from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask to place a call between two endpoints
    Call { from: String, to: String },
    /// Ping for keepalive
    Ping { seq: u64 },
}

/// Messages from server to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after the upgrade
    Admitted {
        session_id: String,
        from: String,
        to: String,
        expires_at: u64,
    },
    CallAccepted { from: String, to: String },
    CallRejected { from: String, to: String, reason: String },
    Pong { seq: u64 },
    Error { message: String },
}

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

/// Check the ticket carried by an upgrade request
pub fn admit(
    state: &GatewayState,
    headers: &HeaderMap,
    from: &str,
    to: &str,
    now: u64,
) -> Result<TicketPayload, AuthError> {
    let jar = CookieJar::from_headers(headers);

    let (info, mac) = match (jar.get(INFO_COOKIE), jar.get(MAC_COOKIE)) {
        (Some(info), Some(mac)) if !info.is_empty() && !mac.is_empty() => (info, mac),
        _ => return Err(AuthError::Validation("ticket cookies missing".to_string())),
    };

    let verifier = TicketVerifier::from_store(&state.secrets)?;
    match verifier.verify(info, jar.get(EXTRA_COOKIE), mac, from, to, now) {
        TicketVerdict::Admitted(payload) => Ok(payload),
        TicketVerdict::Rejected(reason) => Err(reason.into()),
    }
}

/// 400 for input the client got wrong, 403 for a refused ticket
pub fn upgrade_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::Validation(_) => StatusCode::BAD_REQUEST,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AuthError::Authentication(_) | AuthError::Authorization(_) | AuthError::Expired(_) => {
            StatusCode::FORBIDDEN
        }
    }
}

pub async fn ws_handler(
    State(state): State<GatewayState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let now = unix_now();

    // Unparsable endpoints are a client error, whatever the ticket says
    let (from, to) = match (Aor::parse(&query.from), Aor::parse(&query.to)) {
        (Ok(from), Ok(to)) => (from, to),
        _ => return (StatusCode::BAD_REQUEST, "invalid endpoint address").into_response(),
    };

    let ticket = match admit(&state, &headers, &query.from, &query.to, now) {
        Ok(ticket) => ticket,
        Err(e) => {
            if e.is_internal() {
                error!(error = %e, "Ticket check failed internally");
            } else {
                warn!(from = %query.from, to = %query.to, error = %e, "WebSocket ticket refused");
            }
            return (upgrade_status(&e), e.to_string()).into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let session = Arc::new(AdmittedSession::new(from, to, ticket));
    ws.on_upgrade(move |socket| handle_socket(socket, state, session))
}

fn encode(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            error!(error = %e, "Failed to encode server message");
            None
        }
    }
}

async fn send(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    match encode(msg) {
        Some(frame) => sender.send(frame).await.is_ok(),
        None => true,
    }
}

async fn handle_socket(socket: WebSocket, state: GatewayState, session: Arc<AdmittedSession>) {
    let session_id = session.id;
    let (mut sender, mut receiver) = socket.split();
    state.sessions.add(session.clone());

    info!(
        session_id = %session_id,
        from = %session.from,
        to = %session.to,
        "WebSocket session admitted"
    );

    let admitted = ServerMessage::Admitted {
        session_id: session_id.to_string(),
        from: session.from.to_string(),
        to: session.to.to_string(),
        expires_at: session.ticket.expires_at(),
    };

    if send(&mut sender, &admitted).await {
        while let Some(msg_result) = receiver.next().await {
            let reply = match msg_result {
                Ok(Message::Text(text)) => handle_client_message(text.as_str(), &session, unix_now()),
                Ok(Message::Binary(data)) => handle_client_message_bytes(&data, &session, unix_now()),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "WebSocket error");
                    break;
                }
            };

            if !send(&mut sender, &reply).await {
                break;
            }
        }
    }

    debug!(session_id = %session_id, "WebSocket session closed");
    state.sessions.remove(session_id);
}

fn handle_client_message_bytes(data: &[u8], session: &AdmittedSession, now: u64) -> ServerMessage {
    match std::str::from_utf8(data) {
        Ok(text) => handle_client_message(text, session, now),
        Err(_) => ServerMessage::Error {
            message: "binary frames must be UTF-8 JSON".to_string(),
        },
    }
}

/// Answer one client message
pub fn handle_client_message(text: &str, session: &AdmittedSession, now: u64) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Call { from, to }) => match session.check_call(&from, &to, now) {
            Ok(()) => {
                debug!(session_id = %session.id, from = %from, to = %to, "Call accepted");
                ServerMessage::CallAccepted { from, to }
            }
            Err(reason) => {
                debug!(
                    session_id = %session.id,
                    from = %from,
                    to = %to,
                    reason = %reason,
                    "Call refused"
                );
                ServerMessage::CallRejected {
                    from,
                    to,
                    reason: reason.to_string(),
                }
            }
        },
        Ok(ClientMessage::Ping { seq }) => ServerMessage::Pong { seq },
        Err(e) => ServerMessage::Error {
            message: format!("invalid message: {}", e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aor::AorPattern;
    use crate::auth::ticket::TICKET_VERSION;

    fn session() -> AdmittedSession {
        AdmittedSession::new(
            Aor::parse("alice@foo").unwrap(),
            Aor::parse("bob@example.org").unwrap(),
            TicketPayload {
                version: TICKET_VERSION,
                issued_at: 0,
                ttl: 100,
                from: AorPattern::parse("alice@*").unwrap(),
                to: AorPattern::parse("*@example.org").unwrap(),
            },
        )
    }

    #[test]
    fn test_call_in_scope() {
        let reply = handle_client_message(r#"{"type":"call","from":"alice@foo","to":"carol@example.org"}"#, &session(), 10);
        assert!(matches!(reply, ServerMessage::CallAccepted { .. }));
    }

    #[test]
    fn test_call_out_of_scope() {
        let reply = handle_client_message(r#"{"type":"call","from":"mallory@foo","to":"carol@example.org"}"#, &session(), 10);
        match reply {
            ServerMessage::CallRejected { reason, .. } => assert!(reason.contains("scope violation")),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_call_after_ticket_expiry() {
        let call = r#"{"type":"call","from":"alice@foo","to":"carol@example.org"}"#;

        assert!(matches!(
            handle_client_message(call, &session(), 99),
            ServerMessage::CallAccepted { .. }
        ));
        match handle_client_message(call, &session(), 100) {
            ServerMessage::CallRejected { reason, .. } => assert_eq!(reason, "expired"),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_ping_and_garbage() {
        assert!(matches!(
            handle_client_message(r#"{"type":"ping","seq":7}"#, &session(), 10),
            ServerMessage::Pong { seq: 7 }
        ));
        assert!(matches!(
            handle_client_message("not json", &session(), 10),
            ServerMessage::Error { .. }
        ));
    }

    #[test]
    fn test_upgrade_status() {
        assert_eq!(upgrade_status(&AuthError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(upgrade_status(&AuthError::Authentication("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(upgrade_status(&AuthError::Expired("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(upgrade_status(&AuthError::Authorization("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            upgrade_status(&AuthError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
