//! HTTP tests for the gateway router
//!
//! Requests are driven straight through the axum `Router` with
//! `tower::ServiceExt::oneshot`; no socket is bound.

use axum::body::{to_bytes, Body};
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use callgate::accounts::{AccountService, SignupRequest};
use callgate::aor::AorPattern;
use callgate::auth::ticket::compute_mac;
use callgate::auth::{unix_now, SharedSecret, SharedSecretStore, Ticket, TicketIssuer};
use callgate::server::cookies::ticket_cookie_header;
use callgate::server::{CallgateServer, CallgateServerConfig};
use callgate::storage::{AccountRepository, MemoryStore};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const SALT: &str = "gateway-test-salt";
const WS_SECRET: &str = "gateway-test-ws-secret";

struct Harness {
    router: Router,
    accounts: AccountService,
}

fn harness_with(secrets: SharedSecretStore) -> Harness {
    let repo: Arc<dyn AccountRepository> = Arc::new(MemoryStore::new());
    let config = CallgateServerConfig {
        secrets,
        ..Default::default()
    };
    let server = CallgateServer::new(config, repo.clone());

    Harness {
        router: server.router(),
        accounts: AccountService::new(repo),
    }
}

fn harness() -> Harness {
    harness_with(SharedSecretStore::new(
        Some(SharedSecret::new(SALT)),
        Some(SharedSecret::new(WS_SECRET)),
    ))
}

async fn add_active_user(h: &Harness, username: &str, password: &str) {
    let account = h
        .accounts
        .signup(SignupRequest {
            username: username.to_string(),
            password: password.to_string(),
            email: format!("{}@example.org", username),
            ..Default::default()
        })
        .await
        .unwrap();
    h.accounts
        .activate(username, &account.activation_code)
        .await
        .unwrap();
}

fn form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn ws_request(from: &str, to: &str, cookie: Option<&str>) -> Request<Body> {
    let uri = format!(
        "/ws?from={}&to={}",
        urlencoding::encode(from),
        urlencoding::encode(to)
    );
    let mut builder = Request::builder()
        .method("GET")
        .uri(uri)
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

fn ticket(from: &str, to: &str, ttl: u64, now: u64) -> Ticket {
    TicketIssuer::new(SharedSecret::new(WS_SECRET))
        .issue(
            AorPattern::parse(from).unwrap(),
            AorPattern::parse(to).unwrap(),
            ttl,
            None,
            now,
        )
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let response = h.router.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_sets_session_cookies() {
    let h = harness();
    add_active_user(&h, "alice", "secret").await;

    let response = h
        .router
        .clone()
        .oneshot(form("/login", "username=alice&password=secret"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with("user=alice;")));
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("authentication=") && c.contains("Expires=")));

    let body = json_body(response).await;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["username"], "alice");
}

#[tokio::test]
async fn test_login_failures() {
    let h = harness();
    add_active_user(&h, "alice", "secret").await;

    let response = h
        .router
        .clone()
        .oneshot(form("/login", "username=alice&password=wrong"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());

    let response = h
        .router
        .clone()
        .oneshot(form("/login", "username=alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_without_salt_is_internal() {
    let h = harness_with(SharedSecretStore::new(None, Some(SharedSecret::new(WS_SECRET))));
    add_active_user(&h, "alice", "secret").await;

    let response = h
        .router
        .oneshot(form("/login", "username=alice&password=secret"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = json_body(response).await;
    assert_eq!(body["authenticated"], false);
    assert_eq!(body["error_kind"], "internal");
}

#[tokio::test]
async fn test_session_check() {
    let h = harness();

    let response = h.router.clone().oneshot(get("/session", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let token = callgate::auth::session_token("alice", &SharedSecret::new(SALT));
    let cookie = format!("user=alice; authentication={}", token);
    let response = h
        .router
        .clone()
        .oneshot(get("/session", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(set_cookies(&response).len(), 2);

    let response = h
        .router
        .clone()
        .oneshot(get("/session", Some("user=alice; authentication=0000")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_clears_cookies() {
    let h = harness();
    let response = h.router.oneshot(form("/logout", "")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|c| c.contains("Expires=Thu, 01 Jan 1970")));
}

#[tokio::test]
async fn test_signup_and_activate() {
    let h = harness();

    let response = h
        .router
        .clone()
        .oneshot(form(
            "/signup",
            "username=bob&password=pw&email=bob%40example.org",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = h
        .router
        .clone()
        .oneshot(form("/signup", "username=bob&password=pw2&email=b%40x.org"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = h
        .router
        .clone()
        .oneshot(get("/activate?username=bob&code=wrong", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let code = h.accounts.lookup("bob").await.unwrap().unwrap().activation_code;
    let uri = format!("/activate?username=bob&code={}", code);

    let response = h.router.clone().oneshot(get(&uri, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["outcome"], "activated");

    let response = h.router.clone().oneshot(get(&uri, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["outcome"], "already_active");
}

#[tokio::test]
async fn test_ws_missing_ticket_is_bad_request() {
    let h = harness();
    let response = h
        .router
        .oneshot(ws_request("alice@foo", "bob@bar", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ws_malformed_ticket_is_bad_request() {
    let h = harness();
    let info = "not-a-ticket";
    let mac = compute_mac(&SharedSecret::new(WS_SECRET), info, None);
    let cookie = format!("WSSessionInfo={}; WSSessionMAC={}", info, mac);

    let response = h
        .router
        .oneshot(ws_request("alice@foo", "bob@bar", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ws_refused_tickets_are_forbidden() {
    let h = harness();
    let now = unix_now();

    let mut forged = ticket("*@*", "*@*", 600, now);
    let last = forged.mac.pop().unwrap();
    forged.mac.push(if last == '0' { '1' } else { '0' });

    let expired = ticket("*@*", "*@*", 10, now - 1_000);
    let out_of_scope = ticket("alice@*", "*@*", 600, now);

    for (label, t, from) in [
        ("forged", forged, "alice@foo"),
        ("expired", expired, "alice@foo"),
        ("scope", out_of_scope, "mallory@foo"),
    ] {
        let cookie = ticket_cookie_header(&t);
        let response = h
            .router
            .clone()
            .oneshot(ws_request(from, "bob@bar", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", label);
    }
}

#[tokio::test]
async fn test_ws_without_secret_is_internal() {
    let h = harness_with(SharedSecretStore::new(Some(SharedSecret::new(SALT)), None));
    let cookie = ticket_cookie_header(&ticket("*@*", "*@*", 600, unix_now()));

    let response = h
        .router
        .oneshot(ws_request("alice@foo", "bob@bar", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_ws_valid_ticket_passes_the_guard() {
    let h = harness();
    let cookie = ticket_cookie_header(&ticket("alice@*", "*@example.org", 600, unix_now()));

    let response = h
        .router
        .oneshot(ws_request("alice@foo", "carol@example.org", Some(&cookie)))
        .await
        .unwrap();

    // No real connection sits under a oneshot request, so the upgrade itself
    // cannot complete; the ticket check must not be what stops it
    let status = response.status();
    assert_ne!(status, StatusCode::BAD_REQUEST);
    assert_ne!(status, StatusCode::FORBIDDEN);
    assert_ne!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_ws_unparsable_endpoint_is_bad_request() {
    let h = harness();
    let cookie = ticket_cookie_header(&ticket("*@*", "*@*", 600, unix_now()));

    for (from, to) in [("not-an-address", "bob@bar"), ("alice@foo", ""), ("a@b@c", "bob@bar")] {
        let response = h
            .router
            .clone()
            .oneshot(ws_request(from, to, Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{} -> {}", from, to);
    }
}
