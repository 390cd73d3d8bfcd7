//! In-memory user directory and credential table.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use subtle::ConstantTimeEq;

use tenantgate_auth::{CredentialVerifier, StoreError, User, UserStatus, UserStore};
use tenantgate_core::{DomainError, UserId};

#[derive(Debug, Default)]
struct Directory {
    by_id: HashMap<UserId, User>,
    id_by_email: HashMap<String, UserId>,
}

/// In-memory user store keyed by id with a unique email index.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: RwLock<Directory>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user. Records are validated first; an email
    /// already owned by another user is rejected.
    pub fn upsert(&self, mut user: User) -> Result<(), DomainError> {
        normalize_and_validate(&mut user)?;
        self.write()?.put(user)
    }

    pub fn set_status(&self, id: UserId, status: UserStatus) -> Result<bool, DomainError> {
        self.modify(id, |u| u.status = status)
    }

    /// Apply `f` to a stored user and re-validate the result under one write lock.
    pub fn modify(&self, id: UserId, f: impl FnOnce(&mut User)) -> Result<bool, DomainError> {
        let mut dir = self.write()?;
        let Some(mut user) = dir.by_id.get(&id).cloned() else {
            return Ok(false);
        };
        f(&mut user);
        user.id = id;
        normalize_and_validate(&mut user)?;
        dir.put(user)?;
        Ok(true)
    }

    pub fn remove(&self, id: UserId) -> Result<bool, DomainError> {
        let mut dir = self.write()?;
        let Some(user) = dir.by_id.remove(&id) else {
            return Ok(false);
        };
        dir.id_by_email.remove(&user.email);
        Ok(true)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Directory>, DomainError> {
        self.inner
            .write()
            .map_err(|_| DomainError::invariant("user store lock poisoned"))
    }
}

impl Directory {
    fn put(&mut self, user: User) -> Result<(), DomainError> {
        if let Some(owner) = self.id_by_email.get(&user.email) {
            if *owner != user.id {
                return Err(DomainError::validation(format!(
                    "email '{}' is already registered",
                    user.email
                )));
            }
        }
        if let Some(previous) = self.by_id.get(&user.id) {
            let stale = previous.email.clone();
            self.id_by_email.remove(&stale);
        }

        self.id_by_email.insert(user.email.clone(), user.id);
        self.by_id.insert(user.id, user);
        Ok(())
    }
}

fn normalize_and_validate(user: &mut User) -> Result<(), DomainError> {
    user.email = user.email.trim().to_lowercase();
    user.validate()
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let dir = self.inner.read().map_err(|_| poisoned())?;
        Ok(dir.by_id.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.trim().to_lowercase();
        let dir = self.inner.read().map_err(|_| poisoned())?;
        Ok(dir
            .id_by_email
            .get(&email)
            .and_then(|id| dir.by_id.get(id))
            .cloned())
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("user store lock poisoned".to_string())
}

/// Plain secret table for development logins.
///
/// Stores secrets as given; production deployments supply their own
/// `CredentialVerifier` backed by a password hash.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    secrets: RwLock<HashMap<UserId, String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_secret(&self, user_id: UserId, secret: impl Into<String>) -> Result<(), StoreError> {
        let mut secrets = self
            .secrets
            .write()
            .map_err(|_| StoreError::Unavailable("credential store lock poisoned".to_string()))?;
        secrets.insert(user_id, secret.into());
        Ok(())
    }
}

#[async_trait]
impl CredentialVerifier for InMemoryCredentialStore {
    async fn verify(&self, user_id: UserId, secret: &str) -> Result<bool, StoreError> {
        let secrets = self
            .secrets
            .read()
            .map_err(|_| StoreError::Unavailable("credential store lock poisoned".to_string()))?;
        Ok(secrets
            .get(&user_id)
            .is_some_and(|stored| stored.as_bytes().ct_eq(secret.as_bytes()).into()))
    }
}
