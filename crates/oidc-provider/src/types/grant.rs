//! Authorization codes and issued tokens.
//!
//! Every code and every token derived from it share a `grant_id`. The grant
//! is the unit of revocation: replaying a code or a rotated refresh token
//! revokes everything issued under the same grant.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::scope::Scope;

// =============================================================================
// Authorization Code
// =============================================================================

/// A single-use authorization code and the request context it was issued for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The opaque code value.
    pub code: String,

    /// Grant family of every token minted from this code.
    pub grant_id: Uuid,

    /// Client the code was issued to.
    pub client_id: String,

    /// End-user subject.
    pub subject: String,

    /// Redirect URI used in the authorization request.
    pub redirect_uri: String,

    /// Whether `redirect_uri` appeared in the authorization request.
    /// When it did, the token request must repeat it exactly.
    pub redirect_uri_explicit: bool,

    /// Granted scope.
    pub scope: Scope,

    /// OIDC nonce to echo into the ID token.
    pub nonce: Option<String>,

    /// PKCE S256 challenge.
    pub code_challenge: Option<String>,

    /// When the end-user authenticated.
    #[serde(with = "time::serde::rfc3339")]
    pub auth_time: OffsetDateTime,

    /// Issue time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Expiry time.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Set when the code is redeemed. Never cleared.
    #[serde(with = "time::serde::rfc3339::option")]
    pub consumed_at: Option<OffsetDateTime>,
}

impl AuthorizationCode {
    /// Returns `true` if the code has been redeemed.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    /// Returns `true` if the code expired at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

// =============================================================================
// Token Record
// =============================================================================

/// Kind of an issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// JWT access token, keyed by `jti`.
    AccessToken,
    /// Opaque refresh token, keyed by the SHA-256 of its value.
    RefreshToken,
}

impl TokenKind {
    /// RFC 7009 `token_type_hint` value.
    #[must_use]
    pub fn as_hint(&self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// Lifecycle status of a stored token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Usable.
    Active,
    /// Refresh token already exchanged for a successor. Presenting it again
    /// is reuse.
    Rotated,
    /// Explicitly revoked.
    Revoked,
}

/// A token the provider has issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Store key: `jti` for access tokens, SHA-256 hex for refresh tokens.
    pub key: String,

    /// Token kind.
    pub kind: TokenKind,

    /// Grant family.
    pub grant_id: Uuid,

    /// Key of the token this one was derived from, if any.
    pub parent: Option<String>,

    /// Client the token was issued to.
    pub client_id: String,

    /// End-user subject. For `client_credentials` this is the client ID.
    pub subject: String,

    /// Granted scope.
    pub scope: Scope,

    /// When the end-user authenticated, for user-bound grants.
    #[serde(with = "time::serde::rfc3339::option")]
    pub auth_time: Option<OffsetDateTime>,

    /// Issue time.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// Expiry time.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Lifecycle status.
    pub status: TokenStatus,
}

impl TokenRecord {
    /// Returns `true` if the token expired at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }

    /// Returns `true` if the token is active and unexpired at `now`.
    #[must_use]
    pub fn is_usable_at(&self, now: OffsetDateTime) -> bool {
        self.status == TokenStatus::Active && !self.is_expired_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn record(status: TokenStatus, ttl: Duration) -> TokenRecord {
        let now = OffsetDateTime::now_utc();
        TokenRecord {
            key: "k".to_string(),
            kind: TokenKind::RefreshToken,
            grant_id: Uuid::new_v4(),
            parent: None,
            client_id: "foo".to_string(),
            subject: "alice".to_string(),
            scope: Scope::parse("openid"),
            auth_time: Some(now),
            issued_at: now,
            expires_at: now + ttl,
            status,
        }
    }

    #[test]
    fn test_usable_requires_active_and_unexpired() {
        let now = OffsetDateTime::now_utc();
        assert!(record(TokenStatus::Active, Duration::minutes(5)).is_usable_at(now));
        assert!(!record(TokenStatus::Rotated, Duration::minutes(5)).is_usable_at(now));
        assert!(!record(TokenStatus::Revoked, Duration::minutes(5)).is_usable_at(now));
        assert!(!record(TokenStatus::Active, Duration::seconds(-1)).is_usable_at(now));
    }

    #[test]
    fn test_token_kind_hint() {
        assert_eq!(TokenKind::AccessToken.as_hint(), "access_token");
        assert_eq!(TokenKind::RefreshToken.as_hint(), "refresh_token");
    }
}
