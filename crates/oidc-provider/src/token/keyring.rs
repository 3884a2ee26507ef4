//! Signing key ring with rotation.
//!
//! The ring holds exactly one active key, used for every new signature, plus
//! retired keys that remain valid for verification until `retention` has
//! elapsed after their retirement. `retention` must be at least the longest
//! lifetime of any token signed by the provider, so a token never outlives
//! the key that verifies it.
//!
//! Readers never block: the key set lives behind an [`ArcSwap`] and rotation
//! publishes a new set atomically. Concurrent rotations are serialized.

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Header, Validation};
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::{Duration, OffsetDateTime};

use super::jwt::{Jwks, SigningAlgorithm, SigningError, SigningKeyPair};

/// Lifecycle status of a key in the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// Signs new tokens and verifies.
    Active,
    /// Verifies only.
    Retired,
}

/// Public description of a key in the ring.
#[derive(Debug, Clone)]
pub struct KeyInfo {
    /// Key ID.
    pub kid: String,
    /// Algorithm.
    pub algorithm: SigningAlgorithm,
    /// Current status.
    pub status: KeyStatus,
    /// When the key became usable.
    pub not_before: OffsetDateTime,
    /// When a retired key stops verifying. `None` for the active key.
    pub not_after: Option<OffsetDateTime>,
}

struct RetiredKey {
    key: Arc<SigningKeyPair>,
    not_after: OffsetDateTime,
}

struct KeySet {
    active: Arc<SigningKeyPair>,
    retired: Vec<RetiredKey>,
}

impl KeySet {
    fn verifying_key(&self, kid: &str, now: OffsetDateTime) -> Option<&SigningKeyPair> {
        if self.active.kid() == kid {
            return Some(&self.active);
        }
        self.retired
            .iter()
            .find(|r| r.key.kid() == kid && r.not_after > now)
            .map(|r| r.key.as_ref())
    }
}

/// Active signing key plus verify-only retired keys.
pub struct KeyRing {
    keys: ArcSwap<KeySet>,
    algorithm: SigningAlgorithm,
    issuer: String,
    retention: Duration,
    rotation: Mutex<()>,
}

impl KeyRing {
    /// Creates a ring with a freshly generated active key.
    ///
    /// # Arguments
    /// * `algorithm` - Algorithm for this and every future key
    /// * `issuer` - Expected `iss` claim on verification
    /// * `retention` - How long a retired key keeps verifying
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate(
        algorithm: SigningAlgorithm,
        issuer: impl Into<String>,
        retention: Duration,
    ) -> Result<Self, SigningError> {
        let key = SigningKeyPair::generate(algorithm)?;
        Ok(Self::with_key(key, issuer, retention))
    }

    /// Creates a ring around an existing key.
    #[must_use]
    pub fn with_key(key: SigningKeyPair, issuer: impl Into<String>, retention: Duration) -> Self {
        let algorithm = key.algorithm();
        Self {
            keys: ArcSwap::from_pointee(KeySet {
                active: Arc::new(key),
                retired: Vec::new(),
            }),
            algorithm,
            issuer: issuer.into(),
            retention,
            rotation: Mutex::new(()),
        }
    }

    /// Issuer that signed tokens carry.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Algorithm of every key in the ring.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// ID of the active key.
    #[must_use]
    pub fn active_kid(&self) -> String {
        self.keys.load().active.kid().to_string()
    }

    /// Signs `claims` into a compact JWT.
    ///
    /// With `kid = None` the active key signs. A specific `kid` must name the
    /// active key: retired keys never sign.
    ///
    /// # Errors
    /// Returns `KeyUnavailable` for any other `kid`, or `Encoding` if
    /// serialization or signing fails.
    pub fn sign<T: Serialize>(&self, claims: &T, kid: Option<&str>) -> Result<String, SigningError> {
        let set = self.keys.load();
        let key = &set.active;
        if let Some(requested) = kid {
            if requested != key.kid() {
                return Err(SigningError::key_unavailable(requested));
            }
        }

        let mut header = Header::new(key.algorithm().to_jwt_algorithm());
        header.kid = Some(key.kid().to_string());

        jsonwebtoken::encode(&header, claims, key.encoding_key())
            .map_err(|e| SigningError::encoding(e.to_string()))
    }

    /// Verifies a compact JWT and returns its claims.
    ///
    /// Checks signature (active or unexpired retired key chosen by `kid`),
    /// issuer and expiry with no leeway.
    ///
    /// # Errors
    /// `Malformed`, `InvalidSignature`, `InvalidClaims` or `Expired`.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, SigningError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| SigningError::malformed(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| SigningError::malformed("token header has no kid"))?;

        let now = OffsetDateTime::now_utc();
        let set = self.keys.load();
        let Some(key) = set.verifying_key(&kid, now) else {
            // A pruned key only signed tokens that have since expired.
            if unverified_exp(token).is_some_and(|exp| exp <= now.unix_timestamp()) {
                return Err(SigningError::Expired);
            }
            tracing::debug!(kid = %kid, "Token signed by unknown key");
            return Err(SigningError::InvalidSignature);
        };

        let mut validation = Validation::new(key.algorithm().to_jwt_algorithm());
        validation.set_issuer(&[&self.issuer]);
        validation.validate_aud = false;
        validation.leeway = 0;

        jsonwebtoken::decode::<T>(token, key.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(SigningError::from)
    }

    /// Generates a new key, makes it active and demotes the previous active
    /// key to verify-only. Returns the new key ID.
    ///
    /// # Errors
    /// Returns an error if key generation fails; the ring is left unchanged.
    pub fn rotate(&self) -> Result<String, SigningError> {
        let next = SigningKeyPair::generate(self.algorithm)?;
        Ok(self.install(next))
    }

    /// Makes `next` the active key, demoting the current one.
    pub fn install(&self, next: SigningKeyPair) -> String {
        let _guard = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
        let now = OffsetDateTime::now_utc();
        let current = self.keys.load_full();

        let mut retired: Vec<RetiredKey> = current
            .retired
            .iter()
            .filter(|r| r.not_after > now)
            .map(|r| RetiredKey {
                key: Arc::clone(&r.key),
                not_after: r.not_after,
            })
            .collect();
        retired.push(RetiredKey {
            key: Arc::clone(&current.active),
            not_after: now + self.retention,
        });

        let kid = next.kid().to_string();
        tracing::info!(
            kid = %kid,
            retired_kid = %current.active.kid(),
            retired_count = retired.len(),
            "Signing key rotated"
        );

        self.keys.store(Arc::new(KeySet {
            active: Arc::new(next),
            retired,
        }));
        kid
    }

    /// Drops retired keys whose verification window closed before `now`.
    /// Returns how many keys were removed.
    pub fn prune(&self, now: OffsetDateTime) -> usize {
        let _guard = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.keys.load_full();

        let kept: Vec<RetiredKey> = current
            .retired
            .iter()
            .filter(|r| r.not_after > now)
            .map(|r| RetiredKey {
                key: Arc::clone(&r.key),
                not_after: r.not_after,
            })
            .collect();
        let removed = current.retired.len() - kept.len();

        if removed > 0 {
            self.keys.store(Arc::new(KeySet {
                active: Arc::clone(&current.active),
                retired: kept,
            }));
            tracing::info!(removed, "Pruned retired signing keys");
        }
        removed
    }

    /// Describes every key currently in the ring, active key first.
    #[must_use]
    pub fn keys(&self) -> Vec<KeyInfo> {
        let set = self.keys.load();
        let mut infos = vec![KeyInfo {
            kid: set.active.kid().to_string(),
            algorithm: set.active.algorithm(),
            status: KeyStatus::Active,
            not_before: set.active.created_at(),
            not_after: None,
        }];
        infos.extend(set.retired.iter().map(|r| KeyInfo {
            kid: r.key.kid().to_string(),
            algorithm: r.key.algorithm(),
            status: KeyStatus::Retired,
            not_before: r.key.created_at(),
            not_after: Some(r.not_after),
        }));
        infos
    }

    /// Public keys that can currently verify tokens.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        let now = OffsetDateTime::now_utc();
        let set = self.keys.load();
        let mut keys = vec![set.active.to_jwk()];
        keys.extend(
            set.retired
                .iter()
                .filter(|r| r.not_after > now)
                .map(|r| r.key.to_jwk()),
        );
        Jwks { keys }
    }
}

/// Reads `exp` from the payload without checking the signature.
fn unverified_exp(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.get("exp")?.as_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::jwt::AccessTokenClaims;

    const ISSUER: &str = "http://localhost:3000";

    fn ring(retention: Duration) -> KeyRing {
        KeyRing::generate(SigningAlgorithm::ES384, ISSUER, retention).unwrap()
    }

    fn claims(exp_offset: i64) -> AccessTokenClaims {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        AccessTokenClaims {
            iss: ISSUER.to_string(),
            sub: "user-1".to_string(),
            aud: "foo".to_string(),
            exp: now + exp_offset,
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
            scope: "openid".to_string(),
            client_id: "foo".to_string(),
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let ring = ring(Duration::hours(1));
        let token = ring.sign(&claims(300), None).unwrap();

        let decoded: AccessTokenClaims = ring.verify(&token).unwrap();
        assert_eq!(decoded.sub, "user-1");
        assert_eq!(decoded.client_id, "foo");
    }

    #[test]
    fn test_rs256_sign_and_verify() {
        let ring = KeyRing::generate(SigningAlgorithm::RS256, ISSUER, Duration::hours(1)).unwrap();
        let token = ring.sign(&claims(300), None).unwrap();

        let decoded: AccessTokenClaims = ring.verify(&token).unwrap();
        assert_eq!(decoded.scope, "openid");
    }

    #[test]
    fn test_header_carries_active_kid() {
        let ring = ring(Duration::hours(1));
        let token = ring.sign(&claims(300), None).unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some(ring.active_kid().as_str()));
    }

    #[test]
    fn test_retired_key_still_verifies_during_overlap() {
        let ring = ring(Duration::hours(1));
        let old_kid = ring.active_kid();
        let token = ring.sign(&claims(300), None).unwrap();

        let new_kid = ring.rotate().unwrap();
        assert_ne!(old_kid, new_kid);

        let decoded: AccessTokenClaims = ring.verify(&token).unwrap();
        assert_eq!(decoded.sub, "user-1");

        let kids: Vec<String> = ring.jwks().keys.into_iter().map(|k| k.kid).collect();
        assert!(kids.contains(&old_kid));
        assert!(kids.contains(&new_kid));
    }

    #[test]
    fn test_retired_key_cannot_sign() {
        let ring = ring(Duration::hours(1));
        let old_kid = ring.active_kid();
        ring.rotate().unwrap();

        let err = ring.sign(&claims(300), Some(&old_kid)).unwrap_err();
        assert!(matches!(err, SigningError::KeyUnavailable { .. }));
    }

    #[test]
    fn test_expired_token_under_retired_key() {
        let ring = ring(Duration::hours(1));
        let token = ring.sign(&claims(-10), None).unwrap();
        ring.rotate().unwrap();

        let err = ring.verify::<AccessTokenClaims>(&token).unwrap_err();
        assert!(matches!(err, SigningError::Expired));
    }

    #[test]
    fn test_pruned_key_reports_expired_for_expired_tokens() {
        let ring = ring(Duration::seconds(1));
        let expired = ring.sign(&claims(-10), None).unwrap();
        let live = ring.sign(&claims(300), None).unwrap();
        ring.rotate().unwrap();

        let removed = ring.prune(OffsetDateTime::now_utc() + Duration::seconds(5));
        assert_eq!(removed, 1);
        assert_eq!(ring.keys().len(), 1);

        assert!(matches!(
            ring.verify::<AccessTokenClaims>(&expired).unwrap_err(),
            SigningError::Expired
        ));
        assert!(matches!(
            ring.verify::<AccessTokenClaims>(&live).unwrap_err(),
            SigningError::InvalidSignature
        ));
    }

    #[test]
    fn test_prune_keeps_keys_inside_window() {
        let ring = ring(Duration::hours(1));
        ring.rotate().unwrap();
        ring.rotate().unwrap();

        assert_eq!(ring.prune(OffsetDateTime::now_utc()), 0);
        let infos = ring.keys();
        assert_eq!(infos.len(), 3);
        assert_eq!(infos[0].status, KeyStatus::Active);
        assert!(infos[1..].iter().all(|k| k.status == KeyStatus::Retired));
        assert!(infos[1..].iter().all(|k| k.not_after.is_some()));
    }

    #[test]
    fn test_foreign_key_rejected() {
        let ring_a = ring(Duration::hours(1));
        let ring_b = ring(Duration::hours(1));
        let token = ring_a.sign(&claims(300), None).unwrap();

        assert!(matches!(
            ring_b.verify::<AccessTokenClaims>(&token).unwrap_err(),
            SigningError::InvalidSignature
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let ring = ring(Duration::hours(1));
        let token = ring.sign(&claims(300), None).unwrap();

        let mut forged = claims(300);
        forged.sub = "admin".to_string();
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let parts: Vec<&str> = token.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(
            ring.verify::<AccessTokenClaims>(&tampered).unwrap_err(),
            SigningError::InvalidSignature
        ));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let ring = ring(Duration::hours(1));
        let mut c = claims(300);
        c.iss = "https://elsewhere.example".to_string();
        let token = ring.sign(&c, None).unwrap();

        assert!(matches!(
            ring.verify::<AccessTokenClaims>(&token).unwrap_err(),
            SigningError::InvalidClaims { .. }
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let ring = ring(Duration::hours(1));
        assert!(matches!(
            ring.verify::<AccessTokenClaims>("not-a-jwt").unwrap_err(),
            SigningError::Malformed { .. }
        ));
    }
}
