//! Storage backends for callgate
//!
//! - Postgres: durable account table and deployment parameters
//! - Memory: process-local accounts for tests and development

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PostgresConfig, PostgresStore, SALT_PARAMETER};

use crate::accounts::{Account, AccountState, NewAccount};
use crate::auth::PasswordHash;
pub use async_trait::async_trait;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("ambiguous result: {count} rows matched {query} lookup")]
    Ambiguous { query: String, count: usize },

    #[error("username already exists: {0}")]
    Duplicate(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result of a lookup that must match at most one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    FoundUnique(T),
    NotFound,
}

impl<T> Lookup<T> {
    /// Collapse query rows; more than one row is an error, never the first row
    pub fn from_rows(mut rows: Vec<T>, query: &str) -> Result<Self, StorageError> {
        match rows.len() {
            0 => Ok(Lookup::NotFound),
            1 => Ok(Lookup::FoundUnique(rows.remove(0))),
            count => Err(StorageError::Ambiguous {
                query: query.to_string(),
                count,
            }),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::FoundUnique(v) => Some(v),
            Lookup::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::FoundUnique(_))
    }
}

/// Account persistence.
///
/// Implementations own consistency: usernames are unique and
/// `update_state` is an atomic compare-and-set.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn lookup_by_username(&self, username: &str) -> Result<Lookup<Account>, StorageError>;

    async fn lookup_by_credential(
        &self,
        username: &str,
        password_hash: &PasswordHash,
    ) -> Result<Lookup<Account>, StorageError>;

    async fn lookup_by_activation_code(
        &self,
        username: &str,
        code: &str,
    ) -> Result<Lookup<Account>, StorageError>;

    /// Store a new account. Fails with `Duplicate` if the username is taken.
    async fn insert(&self, account: NewAccount) -> Result<Account, StorageError>;

    /// Move `username` from `from` to `to`; returns false if the account was
    /// not in state `from`
    async fn update_state(
        &self,
        username: &str,
        from: AccountState,
        to: AccountState,
    ) -> Result<bool, StorageError>;
}
