//! Remembered consent and end-user login sessions.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::scope::Scope;

/// Scopes an end-user has approved for a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    /// End-user subject.
    pub subject: String,
    /// Client the consent applies to.
    pub client_id: String,
    /// Approved scope.
    pub scope: Scope,
    /// When consent was (last) given.
    #[serde(with = "time::serde::rfc3339")]
    pub granted_at: OffsetDateTime,
}

impl Consent {
    /// Returns `true` if this consent already covers `requested`.
    #[must_use]
    pub fn covers(&self, requested: &Scope) -> bool {
        requested.is_subset(&self.scope)
    }
}

/// A browser login session, referenced by an opaque cookie value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSession {
    /// Opaque session identifier (the cookie value).
    pub id: String,
    /// Authenticated end-user subject.
    pub subject: String,
    /// When the end-user authenticated.
    #[serde(with = "time::serde::rfc3339")]
    pub auth_time: OffsetDateTime,
    /// When the session ends.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl LoginSession {
    /// Returns `true` if the session ended at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}
