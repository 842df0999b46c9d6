//! Signed, expiring bearer tokens.
//!
//! Tokens use the standard three-segment bearer shape
//! (`header.payload.signature`, each segment base64-url without padding) so
//! that any client library expecting that structure interoperates.  The
//! signature is HMAC-SHA-256 over `header.payload` with the server's signing
//! key and is compared in constant time on decode.
//!
//! Decode distinguishes three failures: [`TokenError::Malformed`] for input
//! that does not parse into the expected shape, [`TokenError::InvalidSignature`]
//! for any signature mismatch, and [`TokenError::Expired`] once the expiry
//! instant has passed.  The signature is verified **before** the payload is
//! parsed, so a tampered payload always reports a signature failure and a
//! forged expiry is never even read.  An expired token is rejected no matter
//! how valid its signature is; neither check alone admits a token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::store::Role;

type HmacSha256 = Hmac<Sha256>;

/// Fixed token header: the only supported algorithm is HMAC-SHA-256.
const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Decoded token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account identifier the token was issued to.
    pub sub: i64,
    /// Role copied from the account at issuance.
    pub role: Role,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.  The token is invalid at and after this instant.
    pub exp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Issues and verifies signed tokens with a process-wide signing key.
///
/// The key is read once at startup and immutable afterwards, so the codec is
/// freely cloneable across request handlers without locking.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
}

impl TokenCodec {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(&self.secret).expect("HMAC key of any length is valid")
    }

    /// Issue a token for `subject` with the given role, valid from
    /// `issued_at` until `issued_at + lifetime`.
    pub fn issue(
        &self,
        subject: i64,
        role: Role,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> String {
        let claims = Claims {
            sub: subject,
            role,
            iat: issued_at.timestamp(),
            exp: (issued_at + lifetime).timestamp(),
        };
        // Serializing a struct of integers and a closed enum cannot fail.
        let payload = serde_json::to_vec(&claims).expect("claims serialize to JSON");

        let mut token = String::new();
        token.push_str(&URL_SAFE_NO_PAD.encode(TOKEN_HEADER));
        token.push('.');
        token.push_str(&URL_SAFE_NO_PAD.encode(payload));

        let mut mac = self.mac();
        mac.update(token.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        token.push('.');
        token.push_str(&signature);
        token
    }

    /// Decode and validate a token against the real clock.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_at(token, Utc::now())
    }

    /// Decode and validate a token as of an explicit instant.
    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let mut segments = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed);
        };

        // Signature first: nothing in the payload is trusted until the MAC
        // over `header.payload` checks out (constant-time comparison).
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::InvalidSignature)?;
        let signed_len = header_b64.len() + 1 + payload_b64.len();
        let mut mac = self.mac();
        mac.update(token[..signed_len].as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let header_json = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| TokenError::Malformed)?;
        let header: Header =
            serde_json::from_slice(&header_json).map_err(|_| TokenError::Malformed)?;
        if header.alg != "HS256" {
            return Err(TokenError::Malformed);
        }

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::Malformed)?;
        // Unknown role values fail claim parsing here, at the boundary.
        let claims: Claims =
            serde_json::from_slice(&payload_json).map_err(|_| TokenError::Malformed)?;

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}
