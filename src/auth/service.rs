//! Authentication service: turns credentials into accounts and tokens.
//!
//! Login deliberately reports the same [`AuthError::InvalidCredentials`] for
//! an unknown email and a wrong password, so the error surface cannot be used
//! to enumerate registered accounts.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::auth::password;
use crate::auth::token::TokenCodec;
use crate::store::{Account, CredentialStore, NewAccount, Role, StoreError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown email or wrong password; the two are indistinguishable by
    /// design.
    #[error("incorrect email or password")]
    InvalidCredentials,
    /// Registration conflict on an already-registered email.
    #[error("email already registered")]
    EmailTaken,
    /// Registration with an email that is not syntactically plausible.
    #[error("invalid email address")]
    InvalidEmail,
    /// Infrastructure failure, retriable by the caller.  Detail is logged,
    /// never surfaced.
    #[error("authentication backend unavailable")]
    Unavailable,
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AuthError::EmailTaken,
            StoreError::Unavailable(detail) => {
                warn!(%detail, "credential store error");
                AuthError::Unavailable
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Registration input
// ---------------------------------------------------------------------------

/// Profile fields collected at registration.  The plaintext password lives
/// only for the duration of the call.
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
}

/// Case-fold and trim an email so lookups and uniqueness are insensitive to
/// how the caller typed it.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Minimal syntactic check applied at registration: exactly one `@` with a
/// non-empty local part and a dotted domain, and no whitespace anywhere.
/// Deliverability is not checked; login needs no check because an address
/// that was never registered simply fails the lookup.
pub fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

/// Verifies credentials against the store and issues tokens.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    codec: TokenCodec,
    token_lifetime: Duration,
    bcrypt_cost: u32,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        codec: TokenCodec,
        token_lifetime_minutes: i64,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            store,
            codec,
            token_lifetime: Duration::minutes(token_lifetime_minutes),
            bcrypt_cost,
        }
    }

    /// Verify an email/password pair and issue a bearer token on success.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);

        let Some(account) = self.store.find_by_email(&email).await? else {
            debug!("login attempt for unregistered email");
            return Err(AuthError::InvalidCredentials);
        };

        if !password::verify_password(password, &account.password_hash) {
            debug!(account_id = account.account_id, "login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        info!(account_id = account.account_id, role = %account.role, "login succeeded");
        Ok(self
            .codec
            .issue(account.account_id, account.role, Utc::now(), self.token_lifetime))
    }

    /// Register a new account with the default Customer role.
    pub async fn register(&self, registration: Registration) -> Result<Account, AuthError> {
        self.register_with_role(registration, Role::Customer).await
    }

    /// Register a new account with an explicit role (admin operation).
    pub async fn register_with_role(
        &self,
        registration: Registration,
        role: Role,
    ) -> Result<Account, AuthError> {
        let email = normalize_email(&registration.email);
        if !is_plausible_email(&email) {
            debug!("registration with implausible email rejected");
            return Err(AuthError::InvalidEmail);
        }

        // Fast pre-check for a friendlier conflict; the unique constraint in
        // the store still catches concurrent registrations of the same email.
        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash =
            password::hash_password(&registration.password, self.bcrypt_cost).map_err(|e| {
                warn!(error = %e, "password hashing failed");
                AuthError::Unavailable
            })?;

        let account = self
            .store
            .create(NewAccount {
                email,
                password_hash,
                role,
                first_name: registration.first_name,
                last_name: registration.last_name,
                phone_number: registration.phone_number,
            })
            .await?;

        info!(account_id = account.account_id, role = %account.role, "account registered");
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCredentialStore;

    fn authenticator() -> Authenticator {
        Authenticator::new(
            Arc::new(MemoryCredentialStore::new()),
            TokenCodec::new("test-secret"),
            30,
            4,
        )
    }

    fn registration(email: &str, password: &str) -> Registration {
        Registration {
            email: email.to_string(),
            password: password.to_string(),
            first_name: "Alice".to_string(),
            last_name: "Doe".to_string(),
            phone_number: None,
        }
    }

    // ── Register + login round trip ──────────────────────────────────

    #[tokio::test]
    async fn login_token_carries_subject_and_role() {
        let auth = authenticator();
        let account = auth
            .register(registration("alice@example.com", "hunter2"))
            .await
            .unwrap();
        assert_eq!(account.role, Role::Customer);

        let token = auth.login("alice@example.com", "hunter2").await.unwrap();
        let claims = TokenCodec::new("test-secret").decode(&token).unwrap();
        assert_eq!(claims.sub, account.account_id);
        assert_eq!(claims.role, Role::Customer);
    }

    #[tokio::test]
    async fn register_with_role_issues_admin_tokens() {
        let auth = authenticator();
        let account = auth
            .register_with_role(registration("root@example.com", "s3cret"), Role::Admin)
            .await
            .unwrap();
        assert_eq!(account.role, Role::Admin);

        let token = auth.login("root@example.com", "s3cret").await.unwrap();
        let claims = TokenCodec::new("test-secret").decode(&token).unwrap();
        assert_eq!(claims.role, Role::Admin);
    }

    // ── Enumeration resistance ───────────────────────────────────────

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_indistinguishable() {
        let auth = authenticator();
        auth.register(registration("alice@example.com", "hunter2"))
            .await
            .unwrap();

        let wrong_password = auth
            .login("alice@example.com", "not-hunter2")
            .await
            .unwrap_err();
        let unknown_email = auth.login("nobody@example.com", "hunter2").await.unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_email, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    // ── Email normalization ──────────────────────────────────────────

    #[test]
    fn normalize_email_trims_and_folds_case() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
        assert_eq!(normalize_email("bob@example.com"), "bob@example.com");
    }

    #[tokio::test]
    async fn login_is_insensitive_to_email_case() {
        let auth = authenticator();
        auth.register(registration("Alice@Example.COM", "hunter2"))
            .await
            .unwrap();
        assert!(auth.login("alice@example.com", "hunter2").await.is_ok());
        assert!(auth.login("  ALICE@example.com ", "hunter2").await.is_ok());
    }

    // ── Email shape ──────────────────────────────────────────────────

    #[test]
    fn plausible_email_shapes() {
        assert!(is_plausible_email("alice@example.com"));
        assert!(is_plausible_email("a.b+tag@sub.example.co.uk"));

        assert!(!is_plausible_email(""));
        assert!(!is_plausible_email("plainaddress"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("alice@"));
        assert!(!is_plausible_email("alice@nodot"));
        assert!(!is_plausible_email("alice@.example.com"));
        assert!(!is_plausible_email("alice@example.com."));
        assert!(!is_plausible_email("alice@exa mple.com"));
        assert!(!is_plausible_email("alice@one@two.com"));
    }

    #[tokio::test]
    async fn registration_rejects_implausible_email() {
        let auth = authenticator();
        let err = auth
            .register(registration("not-an-email", "hunter2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidEmail));

        // Nothing was stored; the same address cannot be logged in with.
        let err = auth.login("not-an-email", "hunter2").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    // ── Registration conflicts ───────────────────────────────────────

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let auth = authenticator();
        auth.register(registration("alice@example.com", "hunter2"))
            .await
            .unwrap();
        let err = auth
            .register(registration("ALICE@example.com", "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
    }

    // ── Stored data hygiene ──────────────────────────────────────────

    #[tokio::test]
    async fn plaintext_password_is_never_stored() {
        let auth = authenticator();
        let account = auth
            .register(registration("alice@example.com", "hunter2"))
            .await
            .unwrap();
        assert_ne!(account.password_hash, "hunter2");
        assert!(account.password_hash.starts_with("$2"));
    }
}
