//! In-memory [`CredentialStore`] used by tests and local development.
//!
//! Mirrors the semantics of the PostgreSQL store (unique emails, creation
//! order, monotonically assigned identifiers) without any I/O.

use chrono::Utc;
use tokio::sync::Mutex;

use crate::store::{Account, CredentialStore, NewAccount, Role, StoreError};

#[derive(Default)]
struct Inner {
    next_id: i64,
    accounts: Vec<Account>,
}

/// Non-persistent credential store backed by a `Vec` behind a mutex.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Inner>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.accounts.iter().find(|a| a.email == email).cloned())
    }

    async fn find_by_id(&self, account_id: i64) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .accounts
            .iter()
            .find(|a| a.account_id == account_id)
            .cloned())
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Account>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .accounts
            .iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn create(&self, new: NewAccount) -> Result<Account, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.accounts.iter().any(|a| a.email == new.email) {
            return Err(StoreError::DuplicateEmail);
        }
        inner.next_id += 1;
        let account = Account {
            account_id: inner.next_id,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            first_name: new.first_name,
            last_name: new.last_name,
            phone_number: new.phone_number,
            created_at: Utc::now(),
            updated_at: None,
        };
        inner.accounts.push(account.clone());
        Ok(account)
    }

    async fn update_role(
        &self,
        account_id: i64,
        role: Role,
    ) -> Result<Option<Account>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner
            .accounts
            .iter_mut()
            .find(|a| a.account_id == account_id)
        {
            Some(account) => {
                account.role = role;
                account.updated_at = Some(Utc::now());
                Ok(Some(account.clone()))
            }
            None => Ok(None),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
