//! Per-request access control.
//!
//! Every protected route declares an [`AccessPolicy`]; the guard decodes the
//! presented bearer token, resolves the caller's role, and enforces the
//! policy before any handler logic runs.  All decode failures (missing,
//! malformed, forged, expired) collapse into [`GuardError::Unauthorized`]
//! without detail, for the same anti-enumeration reason login errors are
//! uniform.  A valid token with the wrong role is [`GuardError::Forbidden`],
//! which is deliberately distinct: the caller is authenticated but not
//! permitted.  Nothing persists between requests.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::auth::token::TokenCodec;
use crate::store::Role;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Access requirement declared per route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    /// No token required; the guard passes without decoding.
    Public,
    /// A valid token whose role exactly matches is required.  There is no
    /// role hierarchy: an Admin token does not satisfy a Customer policy.
    Require(Role),
}

/// The authenticated caller attached to a request after a successful check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub account_id: i64,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    /// Missing or unverifiable token (401).
    #[error("authentication required")]
    Unauthorized,
    /// Authenticated but the role does not match the policy (403).
    #[error("insufficient permissions")]
    Forbidden,
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

/// Stateless request gate over the token codec.
#[derive(Clone)]
pub struct AccessGuard {
    codec: TokenCodec,
}

impl AccessGuard {
    pub fn new(codec: TokenCodec) -> Self {
        Self { codec }
    }

    /// Evaluate `policy` against the raw `Authorization` header value.
    ///
    /// Returns `Ok(None)` for public routes and `Ok(Some(identity))` once a
    /// role requirement is satisfied.
    pub fn authorize(
        &self,
        auth_header: Option<&str>,
        policy: AccessPolicy,
    ) -> Result<Option<Identity>, GuardError> {
        match policy {
            AccessPolicy::Public => Ok(None),
            AccessPolicy::Require(role) => self.require(auth_header, role).map(Some),
        }
    }

    /// Require a valid token with exactly `role`.
    pub fn require(&self, auth_header: Option<&str>, role: Role) -> Result<Identity, GuardError> {
        self.require_at(auth_header, role, Utc::now())
    }

    fn require_at(
        &self,
        auth_header: Option<&str>,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Identity, GuardError> {
        let token = auth_header
            .and_then(extract_bearer)
            .ok_or(GuardError::Unauthorized)?;

        let claims = self.codec.decode_at(token, now).map_err(|e| {
            // Log which of malformed/forged/expired it was; the caller only
            // ever sees Unauthorized.
            debug!(error = %e, "token rejected");
            GuardError::Unauthorized
        })?;

        if claims.role != role {
            debug!(
                account_id = claims.sub,
                have = %claims.role,
                need = %role,
                "role mismatch"
            );
            return Err(GuardError::Forbidden);
        }

        Ok(Identity {
            account_id: claims.sub,
            role: claims.role,
        })
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
fn extract_bearer(header_value: &str) -> Option<&str> {
    let token = header_value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
