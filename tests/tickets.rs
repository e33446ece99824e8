//! Integration tests for WebSocket tickets
//!
//! Mint through the issuer, present through the verifier, the way the
//! operator tool and the gateway use them.

use callgate::aor::AorPattern;
use callgate::auth::ticket::compute_mac;
use callgate::auth::{
    AuthError, RejectReason, SharedSecret, SharedSecretStore, TicketIssuer, TicketVerdict,
    TicketVerifier,
};

const TEST_SECRET: &str = "test-secret-for-ticket-tests";

fn pattern(p: &str) -> AorPattern {
    AorPattern::parse(p).unwrap()
}

fn pair() -> (TicketIssuer, TicketVerifier) {
    (
        TicketIssuer::new(SharedSecret::new(TEST_SECRET)),
        TicketVerifier::new(SharedSecret::new(TEST_SECRET)),
    )
}

#[test]
fn test_admitted_then_expired() {
    let (issuer, verifier) = pair();
    let ticket = issuer
        .issue(pattern("*@*"), pattern("*@*"), 1000, None, 1_000_000)
        .unwrap();

    assert_eq!(ticket.info, "1:1000000:1000:*@*:*@*");

    let verdict = verifier.verify(&ticket.info, None, &ticket.mac, "alice@foo", "bob@bar", 1_000_999);
    assert!(verdict.admitted());

    let verdict = verifier.verify(&ticket.info, None, &ticket.mac, "alice@foo", "bob@bar", 1_001_001);
    assert_eq!(verdict.reason(), Some(&RejectReason::Expired));
}

#[test]
fn test_known_mac() {
    let mac = compute_mac(&SharedSecret::new("key"), "1:1000000:1000:*@*:*@*", None);
    assert_eq!(mac, "5ca4ef4e955f99e5b6765a33c2c33d111d93bade");
}

#[test]
fn test_validity_window_boundaries() {
    let (issuer, verifier) = pair();
    let t0 = 50_000;
    let ttl = 300;
    let ticket = issuer
        .issue(pattern("*@*"), pattern("*@*"), ttl, None, t0)
        .unwrap();

    let check = |now| verifier.verify(&ticket.info, None, &ticket.mac, "a@b", "c@d", now);

    assert_eq!(check(t0 - 1).reason(), Some(&RejectReason::Expired));
    assert!(check(t0).admitted());
    assert!(check(t0 + ttl - 1).admitted());
    assert_eq!(check(t0 + ttl).reason(), Some(&RejectReason::Expired));
    assert_eq!(check(t0 + ttl + 1).reason(), Some(&RejectReason::Expired));
}

#[test]
fn test_wildcard_scopes() {
    let (issuer, verifier) = pair();
    let ticket = issuer
        .issue(pattern("alice@*"), pattern("*@example.org"), 60, None, 10)
        .unwrap();

    let check = |from: &str, to: &str| verifier.verify(&ticket.info, None, &ticket.mac, from, to, 20);

    assert!(check("alice@x.com", "anyone@example.org").admitted());
    assert_eq!(
        check("bob@x.com", "anyone@example.org").reason(),
        Some(&RejectReason::ScopeViolation)
    );
    assert_eq!(
        check("alice@x.com", "anyone@other.org").reason(),
        Some(&RejectReason::ScopeViolation)
    );
}

#[test]
fn test_extra_is_covered_by_mac() {
    let (issuer, verifier) = pair();
    let ticket = issuer
        .issue(pattern("*@*"), pattern("*@*"), 60, Some("room=42"), 10)
        .unwrap();

    assert!(verifier
        .verify(&ticket.info, ticket.extra.as_deref(), &ticket.mac, "a@b", "c@d", 20)
        .admitted());

    // Dropping or changing the extra part breaks the MAC
    for extra in [None, Some("room=43")] {
        let verdict = verifier.verify(&ticket.info, extra, &ticket.mac, "a@b", "c@d", 20);
        assert_eq!(verdict.reason(), Some(&RejectReason::Forged));
    }
}

#[test]
fn test_any_flipped_character_is_forged() {
    let (issuer, verifier) = pair();
    let ticket = issuer
        .issue(pattern("alice@*"), pattern("*@*"), 60, Some("x"), 10)
        .unwrap();

    let flip = |s: &str, i: usize| -> String {
        let mut chars: Vec<char> = s.chars().collect();
        chars[i] = if chars[i] == 'z' { 'y' } else { 'z' };
        chars.into_iter().collect()
    };

    for i in 0..ticket.mac.len() {
        let mac = flip(&ticket.mac, i);
        let verdict = verifier.verify(&ticket.info, Some("x"), &mac, "alice@a", "b@c", 20);
        assert_eq!(verdict.reason(), Some(&RejectReason::Forged), "mac position {}", i);
    }

    for i in 0..ticket.info.len() {
        let info = flip(&ticket.info, i);
        let verdict = verifier.verify(&info, Some("x"), &ticket.mac, "alice@a", "b@c", 20);
        assert_eq!(verdict.reason(), Some(&RejectReason::Forged), "info position {}", i);
    }
}

#[test]
fn test_other_secret_is_forged() {
    let (issuer, _) = pair();
    let ticket = issuer
        .issue(pattern("*@*"), pattern("*@*"), 60, None, 10)
        .unwrap();

    let verifier = TicketVerifier::new(SharedSecret::new("some-other-secret"));
    let verdict = verifier.verify(&ticket.info, None, &ticket.mac, "a@b", "c@d", 20);
    assert!(matches!(verdict, TicketVerdict::Rejected(RejectReason::Forged)));
}

#[test]
fn test_missing_secret_is_internal() {
    let secrets = SharedSecretStore::new(Some(SharedSecret::new("salt")), None);
    assert!(matches!(
        TicketVerifier::from_store(&secrets),
        Err(AuthError::Internal(_))
    ));
    assert!(matches!(
        TicketIssuer::from_store(&secrets),
        Err(AuthError::Internal(_))
    ));
}

#[test]
fn test_zero_ttl_refused() {
    let (issuer, _) = pair();
    let err = issuer
        .issue(pattern("*@*"), pattern("*@*"), 0, None, 10)
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));
}
