//! In-memory account store
//!
//! Every operation runs under one mutex, so `update_state` is a true
//! compare-and-set and concurrent activations serialize.

use crate::accounts::{Account, AccountState, NewAccount};
use crate::auth::PasswordHash;
use crate::storage::{AccountRepository, Lookup, StorageError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct Inner {
    accounts: Vec<Account>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a database error until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Insert a row without the uniqueness check. Only useful for
    /// exercising the ambiguous-result path.
    pub fn insert_raw(&self, account: Account) {
        self.inner.lock().accounts.push(account);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Database("store offline".to_string()));
        }
        Ok(())
    }

    fn find<F>(&self, query: &str, pred: F) -> Result<Lookup<Account>, StorageError>
    where
        F: Fn(&Account) -> bool,
    {
        self.check_online()?;
        let rows = self
            .inner
            .lock()
            .accounts
            .iter()
            .filter(|a| pred(a))
            .cloned()
            .collect();
        Lookup::from_rows(rows, query)
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn lookup_by_username(&self, username: &str) -> Result<Lookup<Account>, StorageError> {
        self.find("username", |a| a.username == username)
    }

    async fn lookup_by_credential(
        &self,
        username: &str,
        password_hash: &PasswordHash,
    ) -> Result<Lookup<Account>, StorageError> {
        self.find("credential", |a| {
            a.username == username && a.password_hash == *password_hash
        })
    }

    async fn lookup_by_activation_code(
        &self,
        username: &str,
        code: &str,
    ) -> Result<Lookup<Account>, StorageError> {
        self.find("activation code", |a| {
            a.username == username && a.activation_code == code
        })
    }

    async fn insert(&self, account: NewAccount) -> Result<Account, StorageError> {
        self.check_online()?;
        let mut inner = self.inner.lock();

        if inner.accounts.iter().any(|a| a.username == account.username) {
            return Err(StorageError::Duplicate(account.username));
        }

        inner.next_id += 1;
        let stored = Account {
            id: inner.next_id,
            username: account.username,
            password_hash: account.password_hash,
            fullname: account.fullname,
            domain: account.domain,
            email: account.email,
            state: AccountState::Unverified,
            activation_code: account.activation_code,
            activation_date: account.activation_date,
        };
        inner.accounts.push(stored.clone());
        Ok(stored)
    }

    async fn update_state(
        &self,
        username: &str,
        from: AccountState,
        to: AccountState,
    ) -> Result<bool, StorageError> {
        self.check_online()?;
        let mut inner = self.inner.lock();

        let mut matching = inner
            .accounts
            .iter_mut()
            .filter(|a| a.username == username)
            .collect::<Vec<_>>();

        if matching.len() > 1 {
            return Err(StorageError::Ambiguous {
                query: "update state".to_string(),
                count: matching.len(),
            });
        }

        match matching.pop() {
            Some(account) if account.state == from => {
                account.state = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
