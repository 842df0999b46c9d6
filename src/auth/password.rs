//! Password hashing and verification built on bcrypt.
//!
//! bcrypt only considers the first 72 bytes of input, so passwords are
//! truncated to that length before both hashing and verification; the same
//! truncation must apply on both sides or long passwords would never verify.

use bcrypt::{hash, verify};

const BCRYPT_MAX_BYTES: usize = 72;

fn truncate(plaintext: &str) -> &[u8] {
    let bytes = plaintext.as_bytes();
    &bytes[..bytes.len().min(BCRYPT_MAX_BYTES)]
}

/// Hash a plaintext password with the given bcrypt cost factor.
pub fn hash_password(plaintext: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    hash(truncate(plaintext), cost)
}

/// Check a plaintext password against a stored bcrypt hash.
///
/// A stored hash that cannot be parsed counts as a mismatch rather than an
/// error; the caller cannot act on the distinction and must reject either way.
pub fn verify_password(plaintext: &str, stored_hash: &str) -> bool {
    verify(truncate(plaintext), stored_hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimum legal cost; production cost comes from config.
    const TEST_COST: u32 = 4;

    #[test]
    fn hash_then_verify_roundtrip() {
        let hashed = hash_password("hunter2", TEST_COST).unwrap();
        assert!(verify_password("hunter2", &hashed));
        assert!(!verify_password("hunter3", &hashed));
    }

    #[test]
    fn hash_is_salted() {
        let a = hash_password("hunter2", TEST_COST).unwrap();
        let b = hash_password("hunter2", TEST_COST).unwrap();
        assert_ne!(a, b, "two hashes of the same password must differ");
    }

    #[test]
    fn passwords_identical_in_first_72_bytes_verify_the_same() {
        let base = "x".repeat(BCRYPT_MAX_BYTES);
        let long_a = format!("{base}tail-one");
        let long_b = format!("{base}tail-two");
        let hashed = hash_password(&long_a, TEST_COST).unwrap();
        assert!(verify_password(&long_b, &hashed));
    }

    #[test]
    fn short_passwords_are_not_truncated() {
        let hashed = hash_password("abc", TEST_COST).unwrap();
        assert!(verify_password("abc", &hashed));
        assert!(!verify_password("abcd", &hashed));
    }

    #[test]
    fn unparseable_stored_hash_is_a_mismatch() {
        assert!(!verify_password("hunter2", "not-a-bcrypt-hash"));
        assert!(!verify_password("hunter2", ""));
    }
}
