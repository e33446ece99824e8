//! Page-layer endpoints: login, logout, session check, signup, activation

use crate::accounts::{ActivationOutcome, SignupRequest};
use crate::auth::{
    unix_now, AuthError, AuthResult, Credentials, Session, AUTH_COOKIE, USER_COOKIE,
};
use crate::server::cookies::{session_set_cookies, CookieJar};
use crate::server::gateway::GatewayState;

use axum::extract::{Form, Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

/// HTTP status for an auth failure on a page request
pub fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::Validation(_) => StatusCode::BAD_REQUEST,
        AuthError::Authentication(_) | AuthError::Expired(_) => StatusCode::UNAUTHORIZED,
        AuthError::Authorization(_) => StatusCode::FORBIDDEN,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn with_cookies(status: StatusCode, cookies: Vec<String>, body: impl IntoResponse) -> Response {
    let mut response = (status, body).into_response();
    for cookie in cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => error!(error = %e, "Unrepresentable Set-Cookie value"),
        }
    }
    response
}

fn session_response(state: &GatewayState, result: Result<Session, AuthError>) -> Response {
    let body = AuthResult::from(&result);
    match result {
        Ok(session) => with_cookies(
            StatusCode::OK,
            session_set_cookies(&session.cookies(), &state.cookies),
            Json(body),
        ),
        Err(err) => {
            if err.is_internal() {
                error!(error = %err, "Session check failed internally");
            }
            (status_for(&err), Json(body)).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

pub async fn login(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let jar = CookieJar::from_headers(&headers);
    let credentials = Credentials::new(form.username, form.password);

    let result = state
        .login
        .authenticate(
            jar.get(USER_COOKIE),
            jar.get(AUTH_COOKIE),
            Some(&credentials),
            unix_now(),
        )
        .await;

    session_response(&state, result)
}

pub async fn session(State(state): State<GatewayState>, headers: HeaderMap) -> Response {
    let jar = CookieJar::from_headers(&headers);

    let result = state
        .login
        .authenticate(jar.get(USER_COOKIE), jar.get(AUTH_COOKIE), None, unix_now())
        .await;

    session_response(&state, result)
}

pub async fn logout(State(state): State<GatewayState>) -> Response {
    with_cookies(
        StatusCode::OK,
        session_set_cookies(&state.login.logout(), &state.cookies),
        Json(json!({ "logged_out": true })),
    )
}

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub email: String,
}

pub async fn signup(State(state): State<GatewayState>, Form(form): Form<SignupForm>) -> Response {
    let request = SignupRequest {
        username: form.username,
        password: form.password,
        fullname: form.fullname,
        domain: form.domain,
        email: form.email,
    };

    match state.login.accounts().signup(request).await {
        Ok(account) => {
            // Delivering the code (mail) happens outside the gateway
            info!(
                username = %account.username,
                email = %account.email,
                activation_code = %account.activation_code,
                "Activation code issued"
            );
            (
                StatusCode::CREATED,
                Json(json!({ "username": account.username, "state": account.state })),
            )
                .into_response()
        }
        Err(err) => {
            if err.is_internal() {
                error!(error = %err, "Signup failed internally");
            }
            (status_for(&err), Json(AuthResult::failure(&err))).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ActivateQuery {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub code: String,
}

pub async fn activate(State(state): State<GatewayState>, Query(query): Query<ActivateQuery>) -> Response {
    match state.login.accounts().activate(&query.username, &query.code).await {
        Ok(outcome) => {
            let status = match outcome {
                ActivationOutcome::Activated | ActivationOutcome::AlreadyActive => StatusCode::OK,
                ActivationOutcome::Rejected => StatusCode::FORBIDDEN,
            };
            (status, Json(json!({ "outcome": outcome }))).into_response()
        }
        Err(err) => {
            error!(error = %err, "Activation failed internally");
            (status_for(&err), Json(AuthResult::failure(&err))).into_response()
        }
    }
}
