//! Credential store abstraction layer.
//!
//! Provides the [`CredentialStore`] trait that encapsulates all account
//! persistence (lookup, creation, role changes).  The authenticator and the
//! HTTP handlers dispatch through this trait so that no SQL leaks outside
//! this module.  Two implementations exist: a PostgreSQL store used in
//! production and an in-memory store used by tests.

pub mod memory;
pub mod postgres;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Closed set of account roles.
///
/// Every authorization decision matches exhaustively on this enum; role
/// strings from outside the process (database rows, token payloads) are
/// converted at the boundary and unknown values are rejected there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

impl Role {
    /// Stable string form used in database rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = StoreError;

    fn try_from(s: &str) -> Result<Self, StoreError> {
        match s {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            other => Err(StoreError::Unavailable(format!(
                "unknown role value in store: {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A registered account as stored in the credential store.
///
/// The `password_hash` field is excluded from serialized responses and
/// redacted from `Debug` output; plaintext passwords never reach this type.
#[derive(Clone, Serialize)]
pub struct Account {
    pub account_id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("account_id", &self.account_id)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("phone_number", &self.phone_number)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Fields required to persist a new account.  The email must already be
/// normalized and the password already hashed by the caller.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by a credential store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An account with the given email already exists (unique violation).
    #[error("an account with this email already exists")]
    DuplicateEmail,
    /// Infrastructure failure: connection loss, timeout, corrupt row.
    /// Retriable by the caller; the detail string is for logs only and is
    /// never returned to end users.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over account persistence.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up an account by its normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Look up an account by its identifier.
    async fn find_by_id(&self, account_id: i64) -> Result<Option<Account>, StoreError>;

    /// List accounts in creation order, skipping `skip` rows and returning at
    /// most `limit`.
    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Account>, StoreError>;

    /// Persist a new account, failing with [`StoreError::DuplicateEmail`] if
    /// the email is already registered.
    async fn create(&self, new: NewAccount) -> Result<Account, StoreError>;

    /// Change an account's role.  Returns `None` if no such account exists.
    async fn update_role(&self, account_id: i64, role: Role) -> Result<Option<Account>, StoreError>;

    /// Cheap connectivity probe used by the health check.
    async fn ping(&self) -> Result<(), StoreError>;
}
