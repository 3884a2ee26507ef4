//! Proof Key for Code Exchange (RFC 7636), S256 only.
//!
//! ```
//! use oidc_provider::oauth::pkce::{CodeChallenge, CodeVerifier};
//!
//! let verifier = CodeVerifier::generate();
//! let challenge = CodeChallenge::s256(&verifier);
//!
//! // The provider stores the challenge with the code and checks the
//! // verifier presented at the token endpoint.
//! let stored = CodeChallenge::parse(challenge.as_str(), Some("S256")).unwrap();
//! assert!(stored.verify(&verifier).is_ok());
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::AuthError;

/// Length of a base64url-encoded SHA-256 digest.
const S256_CHALLENGE_LEN: usize = 43;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while parsing or checking PKCE parameters.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside 43..=128.
    #[error("code_verifier must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier uses characters outside the unreserved set.
    #[error("code_verifier may only contain [A-Za-z0-9-._~]")]
    InvalidVerifierCharacters,

    /// Challenge is not a base64url SHA-256 digest.
    #[error("code_challenge must be a base64url-encoded SHA-256 digest")]
    InvalidChallengeFormat,

    /// Method other than S256, or a challenge without a method.
    #[error("Unsupported code_challenge_method: {0}")]
    UnsupportedMethod(String),

    /// Verifier does not hash to the stored challenge.
    #[error("code_verifier does not match code_challenge")]
    VerificationFailed,
}

impl PkceError {
    /// Returns `true` for malformed request parameters, as opposed to a
    /// verifier that simply does not match.
    #[must_use]
    pub fn is_request_error(&self) -> bool {
        !matches!(self, Self::VerificationFailed)
    }
}

impl From<PkceError> for AuthError {
    fn from(err: PkceError) -> Self {
        match err {
            PkceError::VerificationFailed => AuthError::PkceVerificationFailed,
            other => AuthError::invalid_request(other.to_string()),
        }
    }
}

// =============================================================================
// Verifier
// =============================================================================

/// A `code_verifier`: 43 to 128 characters from `[A-Za-z0-9-._~]`.
#[derive(Debug, Clone)]
pub struct CodeVerifier(String);

impl CodeVerifier {
    /// Validates a verifier received from a client.
    ///
    /// # Errors
    /// Returns an error if the length or alphabet is wrong.
    pub fn parse(value: &str) -> Result<Self, PkceError> {
        let len = value.len();
        if !(43..=128).contains(&len) {
            return Err(PkceError::InvalidVerifierLength(len));
        }
        let unreserved = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~');
        if !value.chars().all(unreserved) {
            return Err(PkceError::InvalidVerifierCharacters);
        }
        Ok(Self(value.to_string()))
    }

    /// Generates a random verifier (32 bytes, base64url).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// The verifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Challenge
// =============================================================================

/// An S256 `code_challenge`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChallenge(String);

impl CodeChallenge {
    /// Computes `BASE64URL(SHA256(verifier))`.
    #[must_use]
    pub fn s256(verifier: &CodeVerifier) -> Self {
        Self(URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.0.as_bytes())))
    }

    /// Parses the challenge parameters of an authorization request.
    ///
    /// The method must be `S256`. A challenge sent without a method would
    /// default to `plain`, which is rejected as well.
    ///
    /// # Errors
    /// Returns an error for unsupported methods or malformed challenges.
    pub fn parse(challenge: &str, method: Option<&str>) -> Result<Self, PkceError> {
        match method {
            Some("S256") => {}
            Some(other) => return Err(PkceError::UnsupportedMethod(other.to_string())),
            None => return Err(PkceError::UnsupportedMethod("plain".to_string())),
        }

        let decodes = URL_SAFE_NO_PAD
            .decode(challenge)
            .is_ok_and(|digest| digest.len() == 32);
        if challenge.len() != S256_CHALLENGE_LEN || !decodes {
            return Err(PkceError::InvalidChallengeFormat);
        }
        Ok(Self(challenge.to_string()))
    }

    /// Wraps a challenge that was validated before it was stored.
    #[must_use]
    pub fn from_stored(challenge: impl Into<String>) -> Self {
        Self(challenge.into())
    }

    /// Checks `verifier` against this challenge in constant time.
    ///
    /// # Errors
    /// Returns `VerificationFailed` on mismatch.
    pub fn verify(&self, verifier: &CodeVerifier) -> Result<(), PkceError> {
        let expected = Self::s256(verifier);
        if bool::from(self.0.as_bytes().ct_eq(expected.0.as_bytes())) {
            Ok(())
        } else {
            Err(PkceError::VerificationFailed)
        }
    }

    /// The challenge string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the challenge.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Checks a token request's `code_verifier` against the challenge stored with
/// a code.
///
/// A code issued without a challenge must not be redeemed with a verifier and
/// vice versa.
///
/// # Errors
/// `PkceVerificationFailed` for a mismatch, `InvalidRequest` for a malformed
/// or unexpected verifier.
pub fn verify_code_verifier(stored: Option<&str>, presented: Option<&str>) -> Result<(), AuthError> {
    match (stored, presented) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(AuthError::invalid_request(
            "code_verifier sent for a code issued without code_challenge",
        )),
        (Some(_), None) => Err(AuthError::invalid_request("code_verifier is required")),
        (Some(challenge), Some(verifier)) => {
            let verifier = CodeVerifier::parse(verifier).map_err(|_| AuthError::PkceVerificationFailed)?;
            CodeChallenge::from_stored(challenge).verify(&verifier)?;
            Ok(())
        }
    }
}
