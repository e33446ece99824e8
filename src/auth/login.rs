//! Login flow for the page layer
//!
//! Freshly submitted credentials always win over an existing session
//! cookie: they are validated on their own, and a failure never falls back
//! to the cookie.

use crate::accounts::{AccountService, CredentialCheck};
use crate::auth::{AuthError, AuthErrorKind, PasswordHash, Session, SessionCookies, SessionManager};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Username and cleartext password as typed on the login form
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// What the page layer gets back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthResult {
    pub authenticated: bool,
    pub username: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<AuthErrorKind>,
}

impl AuthResult {
    pub fn success(username: &str) -> Self {
        Self {
            authenticated: true,
            username: Some(username.to_string()),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(err: &AuthError) -> Self {
        Self {
            authenticated: false,
            username: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
        }
    }
}

impl From<&Result<Session, AuthError>> for AuthResult {
    fn from(result: &Result<Session, AuthError>) -> Self {
        match result {
            Ok(session) => AuthResult::success(&session.username),
            Err(err) => AuthResult::failure(err),
        }
    }
}

#[derive(Clone)]
pub struct LoginFlow {
    accounts: AccountService,
    sessions: SessionManager,
}

impl LoginFlow {
    pub fn new(accounts: AccountService, sessions: SessionManager) -> Self {
        Self { accounts, sessions }
    }

    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Validate credentials and mint a session for an active account
    pub async fn login(&self, credentials: &Credentials, now: u64) -> Result<Session, AuthError> {
        if credentials.username.is_empty() || credentials.password.is_empty() {
            return Err(AuthError::Validation(
                "username and password are required".to_string(),
            ));
        }

        let hash = PasswordHash::compute(&credentials.username, &credentials.password);
        let check = self
            .accounts
            .validate_credentials(&credentials.username, &hash)
            .await
            .inspect_err(|e| warn!(username = %credentials.username, error = %e, "Credential lookup failed"))?;

        match check {
            CredentialCheck::Active => {
                let session = self.sessions.issue(&credentials.username, now)?;
                info!(username = %credentials.username, "Login succeeded");
                Ok(session)
            }
            CredentialCheck::Unverified => Err(AuthError::Authentication(
                "account has not been activated".to_string(),
            )),
            CredentialCheck::Disabled => {
                Err(AuthError::Authentication("account is disabled".to_string()))
            }
            CredentialCheck::NoMatch => {
                debug!(username = %credentials.username, "Login rejected");
                Err(AuthError::Authentication(
                    "username or password incorrect".to_string(),
                ))
            }
        }
    }

    /// Authenticate a request from its cookies and, if present, freshly
    /// submitted credentials
    pub async fn authenticate(
        &self,
        user_cookie: Option<&str>,
        auth_cookie: Option<&str>,
        submitted: Option<&Credentials>,
        now: u64,
    ) -> Result<Session, AuthError> {
        if let Some(credentials) = submitted {
            if let Some(current) = user_cookie.filter(|u| !u.is_empty()) {
                if current != credentials.username {
                    debug!(
                        session_user = %current,
                        submitted_user = %credentials.username,
                        "Credentials submitted for a different user; ignoring session cookie"
                    );
                }
            }
            return self.login(credentials, now).await;
        }

        self.sessions.verify(user_cookie, auth_cookie, now)
    }

    pub fn logout(&self) -> SessionCookies {
        self.sessions.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::SignupRequest;
    use crate::auth::{SharedSecret, SharedSecretStore, DEFAULT_SESSION_DURATION};
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    async fn flow_with_users() -> LoginFlow {
        let accounts = AccountService::new(Arc::new(MemoryStore::new()));
        for name in ["alice", "bob"] {
            let account = accounts
                .signup(SignupRequest {
                    username: name.to_string(),
                    password: format!("{}-pw", name),
                    email: format!("{}@example.org", name),
                    ..Default::default()
                })
                .await
                .unwrap();
            accounts.activate(name, &account.activation_code).await.unwrap();
        }
        accounts
            .signup(SignupRequest {
                username: "carol".to_string(),
                password: "carol-pw".to_string(),
                email: "carol@example.org".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let secrets = SharedSecretStore::new(Some(SharedSecret::new("salt")), None);
        LoginFlow::new(
            accounts,
            SessionManager::new(Arc::new(secrets), DEFAULT_SESSION_DURATION),
        )
    }

    #[tokio::test]
    async fn test_login_active_account() {
        let flow = flow_with_users().await;
        let session = flow.login(&Credentials::new("alice", "alice-pw"), 100).await.unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(session.expires_at, 100 + DEFAULT_SESSION_DURATION);
    }

    #[tokio::test]
    async fn test_login_failures() {
        let flow = flow_with_users().await;

        let err = flow.login(&Credentials::new("alice", "nope"), 0).await.unwrap_err();
        assert!(matches!(err, AuthError::Authentication(_)));

        let err = flow.login(&Credentials::new("carol", "carol-pw"), 0).await.unwrap_err();
        assert!(matches!(err, AuthError::Authentication(_)));

        let err = flow.login(&Credentials::new("", ""), 0).await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn test_submitted_credentials_override_cookie() {
        let flow = flow_with_users().await;
        let alice = flow.login(&Credentials::new("alice", "alice-pw"), 0).await.unwrap();

        // Valid alice cookie, wrong password for bob: must fail, not fall back to alice
        let err = flow
            .authenticate(
                Some("alice"),
                Some(&alice.token),
                Some(&Credentials::new("bob", "wrong")),
                10,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Authentication(_)));

        // Correct bob credentials replace the alice session
        let bob = flow
            .authenticate(
                Some("alice"),
                Some(&alice.token),
                Some(&Credentials::new("bob", "bob-pw")),
                10,
            )
            .await
            .unwrap();
        assert_eq!(bob.username, "bob");
    }

    #[tokio::test]
    async fn test_cookie_only_authentication() {
        let flow = flow_with_users().await;
        let alice = flow.login(&Credentials::new("alice", "alice-pw"), 0).await.unwrap();

        let session = flow
            .authenticate(Some("alice"), Some(&alice.token), None, 50)
            .await
            .unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(session.expires_at, 50 + DEFAULT_SESSION_DURATION);

        let result = AuthResult::from(&flow.authenticate(None, None, None, 50).await);
        assert!(!result.authenticated);
        assert_eq!(result.error_kind, Some(AuthErrorKind::Validation));
    }
}
