//! Signing key rotation: overlap window, pruning and verification failures.

use oidc_provider::token::{AccessTokenClaims, KeyRing, KeyStatus, SigningAlgorithm, SigningError};
use time::{Duration, OffsetDateTime};

const ISSUER: &str = "https://id.example.com";

fn claims(exp_in: Duration) -> AccessTokenClaims {
    let now = OffsetDateTime::now_utc();
    AccessTokenClaims {
        iss: ISSUER.to_string(),
        sub: "alice".to_string(),
        aud: "foo".to_string(),
        exp: (now + exp_in).unix_timestamp(),
        iat: now.unix_timestamp(),
        jti: uuid::Uuid::new_v4().to_string(),
        scope: "openid".to_string(),
        client_id: "foo".to_string(),
    }
}

fn ring() -> KeyRing {
    KeyRing::generate(SigningAlgorithm::ES384, ISSUER, Duration::hours(1)).unwrap()
}

#[test]
fn token_signed_before_rotation_verifies_during_overlap() {
    let keys = ring();
    let before = keys.sign(&claims(Duration::minutes(5)), None).unwrap();
    let old_kid = keys.active_kid();

    let new_kid = keys.rotate().unwrap();
    assert_ne!(old_kid, new_kid);

    let verified: AccessTokenClaims = keys.verify(&before).unwrap();
    assert_eq!(verified.sub, "alice");

    let after = keys.sign(&claims(Duration::minutes(5)), None).unwrap();
    assert!(keys.verify::<AccessTokenClaims>(&after).is_ok());

    let jwks = keys.jwks();
    let kids: Vec<_> = jwks.keys.iter().map(|k| k.kid.as_str()).collect();
    assert_eq!(kids.len(), 2);
    assert!(kids.contains(&old_kid.as_str()));
    assert!(kids.contains(&new_kid.as_str()));

    let infos = keys.keys();
    assert_eq!(infos[0].status, KeyStatus::Active);
    assert_eq!(infos[1].status, KeyStatus::Retired);
}

#[test]
fn retired_key_never_signs() {
    let keys = ring();
    let old_kid = keys.active_kid();
    keys.rotate().unwrap();

    let result = keys.sign(&claims(Duration::minutes(5)), Some(&old_kid));
    assert!(matches!(result, Err(SigningError::KeyUnavailable { .. })));
}

#[test]
fn pruned_key_stops_verifying() {
    let keys = ring();
    let before = keys.sign(&claims(Duration::hours(3)), None).unwrap();
    keys.rotate().unwrap();

    assert_eq!(keys.prune(OffsetDateTime::now_utc()), 0);
    assert_eq!(keys.prune(OffsetDateTime::now_utc() + Duration::hours(2)), 1);

    assert_eq!(keys.jwks().keys.len(), 1);
    assert!(matches!(
        keys.verify::<AccessTokenClaims>(&before),
        Err(SigningError::InvalidSignature)
    ));
}

#[test]
fn expired_token_is_reported_as_expired() {
    let keys = ring();
    let token = keys.sign(&claims(Duration::minutes(-1)), None).unwrap();
    assert!(matches!(
        keys.verify::<AccessTokenClaims>(&token),
        Err(SigningError::Expired)
    ));
}

#[test]
fn tampered_and_garbage_tokens() {
    let keys = ring();
    let token = keys.sign(&claims(Duration::minutes(5)), None).unwrap();

    // Header and payload from one ring, signature from another.
    let other = ring();
    let foreign = other.sign(&claims(Duration::minutes(5)), None).unwrap();
    let (head, _) = token.rsplit_once('.').unwrap();
    let (_, foreign_sig) = foreign.rsplit_once('.').unwrap();
    let forged = format!("{head}.{foreign_sig}");
    assert!(matches!(
        keys.verify::<AccessTokenClaims>(&forged),
        Err(SigningError::InvalidSignature)
    ));

    assert!(matches!(
        keys.verify::<AccessTokenClaims>("not-a-jwt"),
        Err(SigningError::Malformed { .. })
    ));
}
