//! Account lifecycle
//!
//! ```text
//!   signup          activate(code)         disable (admin)
//!  ───────▶  U  ─────────────────▶  A  ──────────────────▶  D
//!            └──────────────────── disable (admin) ───────▶  D
//! ```
//!
//! `D` is terminal. Re-activating an `A` account reports `AlreadyActive`,
//! which is neither success nor failure.

use crate::auth::{AuthError, PasswordHash};
use crate::storage::{AccountRepository, Lookup, StorageError};
use chrono::{NaiveDate, Utc};
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Persisted account state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountState {
    Unverified,
    Active,
    Disabled,
}

impl AccountState {
    /// Single-character storage code
    pub fn code(&self) -> &'static str {
        match self {
            AccountState::Unverified => "U",
            AccountState::Active => "A",
            AccountState::Disabled => "D",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "U" => Some(AccountState::Unverified),
            "A" => Some(AccountState::Active),
            "D" => Some(AccountState::Disabled),
            _ => None,
        }
    }
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountState::Unverified => write!(f, "unverified"),
            AccountState::Active => write!(f, "active"),
            AccountState::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub password_hash: PasswordHash,
    pub fullname: String,
    pub domain: String,
    pub email: String,
    pub state: AccountState,
    pub activation_code: String,
    pub activation_date: NaiveDate,
}

/// An account about to be inserted (always starts `Unverified`)
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password_hash: PasswordHash,
    pub fullname: String,
    pub domain: String,
    pub email: String,
    pub activation_code: String,
    pub activation_date: NaiveDate,
}

/// Signup form as submitted by the page layer
#[derive(Debug, Clone, Default)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub fullname: String,
    pub domain: String,
    pub email: String,
}

/// Result of checking a username/password-hash pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialCheck {
    Active,
    Unverified,
    Disabled,
    NoMatch,
}

impl From<AccountState> for CredentialCheck {
    fn from(state: AccountState) -> Self {
        match state {
            AccountState::Active => CredentialCheck::Active,
            AccountState::Unverified => CredentialCheck::Unverified,
            AccountState::Disabled => CredentialCheck::Disabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationOutcome {
    Activated,
    AlreadyActive,
    Rejected,
}

/// Generate a random activation code (32 hex chars)
pub fn generate_activation_code() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    hex::encode(bytes)
}

/// State machine over an [`AccountRepository`]
#[derive(Clone)]
pub struct AccountService {
    repo: Arc<dyn AccountRepository>,
}

impl AccountService {
    pub fn new(repo: Arc<dyn AccountRepository>) -> Self {
        Self { repo }
    }

    /// State of the account matching both fields, or `NoMatch`
    pub async fn validate_credentials(
        &self,
        username: &str,
        password_hash: &PasswordHash,
    ) -> Result<CredentialCheck, AuthError> {
        if username.is_empty() {
            return Ok(CredentialCheck::NoMatch);
        }

        match self.repo.lookup_by_credential(username, password_hash).await? {
            Lookup::FoundUnique(account) => Ok(account.state.into()),
            Lookup::NotFound => Ok(CredentialCheck::NoMatch),
        }
    }

    /// Transition `U -> A` if `code` matches exactly
    pub async fn activate(&self, username: &str, code: &str) -> Result<ActivationOutcome, AuthError> {
        if username.is_empty() || code.is_empty() {
            return Ok(ActivationOutcome::Rejected);
        }

        let account = match self.repo.lookup_by_activation_code(username, code).await? {
            Lookup::FoundUnique(account) => account,
            Lookup::NotFound => {
                debug!(username = %username, "Activation code mismatch");
                return Ok(ActivationOutcome::Rejected);
            }
        };

        match account.state {
            AccountState::Active => Ok(ActivationOutcome::AlreadyActive),
            AccountState::Disabled => Ok(ActivationOutcome::Rejected),
            AccountState::Unverified => {
                if self
                    .repo
                    .update_state(username, AccountState::Unverified, AccountState::Active)
                    .await?
                {
                    info!(username = %username, "Account activated");
                    return Ok(ActivationOutcome::Activated);
                }

                // Someone else moved the account first; report what they left behind
                match self.repo.lookup_by_username(username).await? {
                    Lookup::FoundUnique(a) if a.state == AccountState::Active => {
                        Ok(ActivationOutcome::AlreadyActive)
                    }
                    _ => Ok(ActivationOutcome::Rejected),
                }
            }
        }
    }

    pub async fn username_in_use(&self, username: &str) -> Result<bool, AuthError> {
        Ok(self.repo.lookup_by_username(username).await?.is_found())
    }

    /// Create an `Unverified` account; returns it with its activation code
    pub async fn signup(&self, request: SignupRequest) -> Result<Account, AuthError> {
        for (field, value) in [
            ("username", &request.username),
            ("password", &request.password),
            ("email", &request.email),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::Validation(format!("{} is required", field)));
            }
        }
        if request.username.contains(char::is_whitespace) {
            return Err(AuthError::Validation(
                "username may not contain whitespace".to_string(),
            ));
        }

        if self.username_in_use(&request.username).await? {
            return Err(AuthError::Validation(format!(
                "username '{}' is already in use",
                request.username
            )));
        }

        let new_account = NewAccount {
            password_hash: PasswordHash::compute(&request.username, &request.password),
            username: request.username,
            fullname: request.fullname,
            domain: request.domain,
            email: request.email,
            activation_code: generate_activation_code(),
            activation_date: Utc::now().date_naive(),
        };

        match self.repo.insert(new_account).await {
            Ok(account) => {
                info!(username = %account.username, "Account created");
                Ok(account)
            }
            Err(StorageError::Duplicate(username)) => Err(AuthError::Validation(format!(
                "username '{}' is already in use",
                username
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Admin action: any state becomes `Disabled`
    pub async fn disable(&self, username: &str) -> Result<(), AuthError> {
        let mut state = self.current_state(username).await?;

        // States only move forward (U -> A -> D), so this settles quickly
        loop {
            if state == AccountState::Disabled {
                return Ok(());
            }

            if self
                .repo
                .update_state(username, state, AccountState::Disabled)
                .await?
            {
                info!(username = %username, "Account disabled");
                return Ok(());
            }

            let observed = self.current_state(username).await?;
            debug!(
                username = %username,
                expected = %state,
                observed = %observed,
                "Account state changed during disable"
            );
            state = observed;
        }
    }

    async fn current_state(&self, username: &str) -> Result<AccountState, AuthError> {
        self.repo
            .lookup_by_username(username)
            .await?
            .into_option()
            .map(|account| account.state)
            .ok_or_else(|| AuthError::Validation(format!("no such account '{}'", username)))
    }

    /// Password resets are only offered to active accounts with a matching email
    pub async fn password_reset_eligible(&self, username: &str, email: &str) -> Result<bool, AuthError> {
        Ok(match self.repo.lookup_by_username(username).await? {
            Lookup::FoundUnique(a) => a.state == AccountState::Active && a.email == email,
            Lookup::NotFound => false,
        })
    }

    pub async fn lookup(&self, username: &str) -> Result<Option<Account>, AuthError> {
        Ok(self.repo.lookup_by_username(username).await?.into_option())
    }
}
