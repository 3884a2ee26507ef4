//! Secret generation, hashing and comparison.
//!
//! Three kinds of secrets pass through the provider:
//!
//! - **Opaque tokens** (authorization codes, refresh tokens, login sessions):
//!   256 random bits, base64url. Refresh tokens are stored as SHA-256 hex.
//! - **Client secrets**: stored as SHA-256 hex and compared in constant time.
//!   Client secrets are high-entropy, so a fast digest is sufficient.
//! - **End-user passwords**: Argon2id in PHC string format.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Generates a new opaque token (32 random bytes, base64url without padding).
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 of `token` as lowercase hex. Used as the store key for refresh
/// tokens so the plaintext never sits in the store.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Hashes a client secret for storage.
#[must_use]
pub fn hash_client_secret(secret: &str) -> String {
    hash_token(secret)
}

/// Compares a presented client secret against a stored hash in constant time.
///
/// A malformed stored hash never matches.
#[must_use]
pub fn verify_client_secret(secret: &str, stored_hash: &str) -> bool {
    let Ok(expected) = hex::decode(stored_hash) else {
        return false;
    };
    let presented = Sha256::digest(secret.as_bytes());
    presented.as_slice().ct_eq(expected.as_slice()).into()
}

/// Hashes an end-user password with Argon2id.
///
/// # Errors
/// Returns `argon2::password_hash::Error` if hashing fails (rare).
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verifies an end-user password against a PHC hash.
///
/// # Errors
/// Returns `Err` only if the stored hash is not a valid PHC string.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_is_unique_and_urlsafe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_hash_token_is_deterministic_hex() {
        let h1 = hash_token("abc");
        assert_eq!(h1, hash_token("abc"));
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, hash_token("abd"));
    }

    #[test]
    fn test_client_secret_verification() {
        let stored = hash_client_secret("bar");
        assert!(verify_client_secret("bar", &stored));
        assert!(!verify_client_secret("baz", &stored));
        assert!(!verify_client_secret("", &stored));
        assert!(!verify_client_secret("bar", "not-hex"));
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
        assert!(verify_password("x", "garbage").is_err());
    }
}
