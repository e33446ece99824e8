//! Admitted WebSocket sessions

use crate::aor::Aor;
use crate::auth::{RejectReason, TicketPayload};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A WebSocket session let in by a ticket
#[derive(Debug)]
pub struct AdmittedSession {
    /// Unique session ID
    pub id: Uuid,
    /// Endpoints the upgrade request was checked against
    pub from: Aor,
    pub to: Aor,
    /// Ticket the session was admitted with
    pub ticket: TicketPayload,
}

impl AdmittedSession {
    pub fn new(from: Aor, to: Aor, ticket: TicketPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            to,
            ticket,
        }
    }

    /// Check a call against the ticket's validity window, then its scope
    pub fn check_call(&self, from: &str, to: &str, now: u64) -> Result<(), RejectReason> {
        if !self.ticket.is_valid_at(now) {
            return Err(RejectReason::Expired);
        }
        if !self.ticket.covers(from, to) {
            return Err(RejectReason::ScopeViolation);
        }
        Ok(())
    }
}

/// Registry of live admitted sessions
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, Arc<AdmittedSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, session: Arc<AdmittedSession>) {
        self.sessions.insert(session.id, session);
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<AdmittedSession>> {
        self.sessions.remove(&id).map(|(_, s)| s)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aor::AorPattern;
    use crate::auth::ticket::TICKET_VERSION;

    fn session(from: &str, to_pattern: &str) -> Arc<AdmittedSession> {
        let ticket = TicketPayload {
            version: TICKET_VERSION,
            issued_at: 0,
            ttl: 100,
            from: AorPattern::any(),
            to: AorPattern::parse(to_pattern).unwrap(),
        };
        Arc::new(AdmittedSession::new(
            Aor::parse(from).unwrap(),
            Aor::parse("bob@example.org").unwrap(),
            ticket,
        ))
    }

    #[test]
    fn test_registry_add_remove() {
        let registry = SessionRegistry::new();
        let s = session("alice@foo", "*@*");
        let id = s.id;

        registry.add(s);
        assert_eq!(registry.count(), 1);

        assert!(registry.remove(id).is_some());
        assert_eq!(registry.count(), 0);
        assert!(registry.remove(id).is_none());
    }

    #[test]
    fn test_check_call_scope_and_window() {
        let s = session("alice@foo", "*@example.org");
        assert_eq!(s.check_call("alice@foo", "carol@example.org", 50), Ok(()));
        assert_eq!(
            s.check_call("alice@foo", "carol@other.org", 50),
            Err(RejectReason::ScopeViolation)
        );
        assert_eq!(
            s.check_call("alice@foo", "carol@example.org", 100),
            Err(RejectReason::Expired)
        );
    }
}
