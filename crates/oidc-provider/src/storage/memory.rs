//! In-memory store.
//!
//! Nothing survives a restart: after a restart every code, token, consent and
//! login session is gone and clients are re-registered from configuration.
//!
//! Per-record atomicity comes from `DashMap` shard locks: a state change is a
//! check-and-set performed while holding the entry's write guard. When both
//! the grant index and the token map are locked, the grant index is always
//! locked first.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::{
    ClientStorage, CodeStorage, ConsentStorage, FlowStorage, GrantStore, LoginSessionStorage,
    TokenStorage,
};
use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::flow::AuthorizationFlow;
use crate::types::{
    AuthorizationCode, Client, Consent, LoginSession, TokenKind, TokenRecord, TokenStatus,
};

/// How long a revoked grant keeps revoking tokens written after it.
const REVOKED_GRANT_RETENTION: Duration = Duration::minutes(10);

#[derive(Debug, Default)]
struct GrantEntry {
    tokens: Vec<String>,
    revoked_at: Option<OffsetDateTime>,
}

/// Process-local store for clients, grants and sessions.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    clients: DashMap<String, Client>,
    codes: DashMap<String, AuthorizationCode>,
    tokens: DashMap<String, TokenRecord>,
    grants: DashMap<Uuid, GrantEntry>,
    consents: DashMap<(String, String), Consent>,
    flows: DashMap<String, AuthorizationFlow>,
    sessions: DashMap<String, LoginSession>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens, including revoked and rotated ones.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Number of stored authorization codes, including consumed ones.
    #[must_use]
    pub fn code_count(&self) -> usize {
        self.codes.len()
    }

    fn revoke_keys(&self, keys: &[String]) -> usize {
        let mut revoked = 0;
        for key in keys {
            if let Some(mut record) = self.tokens.get_mut(key) {
                if record.status != TokenStatus::Revoked {
                    record.status = TokenStatus::Revoked;
                    revoked += 1;
                }
            }
        }
        revoked
    }
}

// ---- Clients ----

#[async_trait]
impl ClientStorage for InMemoryStore {
    async fn insert_client(&self, client: Client) -> AuthResult<()> {
        match self.clients.entry(client.client_id.clone()) {
            Entry::Occupied(_) => Err(AuthError::DuplicateClient {
                client_id: client.client_id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(client);
                Ok(())
            }
        }
    }

    async fn find_client(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.get(client_id).map(|c| c.value().clone()))
    }

    async fn replace_client(&self, client: Client) -> AuthResult<()> {
        match self.clients.get_mut(&client.client_id) {
            Some(mut existing) => {
                *existing = client;
                Ok(())
            }
            None => Err(AuthError::UnknownClient {
                client_id: client.client_id,
            }),
        }
    }

    async fn delete_client(&self, client_id: &str) -> AuthResult<bool> {
        Ok(self.clients.remove(client_id).is_some())
    }

    async fn list_clients(&self) -> AuthResult<Vec<Client>> {
        let mut clients: Vec<Client> = self.clients.iter().map(|c| c.value().clone()).collect();
        clients.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(clients)
    }
}

// ---- Codes ----

#[async_trait]
impl CodeStorage for InMemoryStore {
    async fn issue_code(&self, code: AuthorizationCode) -> AuthResult<()> {
        self.codes.insert(code.code.clone(), code);
        Ok(())
    }

    async fn redeem_code(&self, code: &str, now: OffsetDateTime) -> AuthResult<AuthorizationCode> {
        let mut entry = self.codes.get_mut(code).ok_or(AuthError::CodeNotFound)?;
        if entry.is_consumed() {
            return Err(AuthError::CodeAlreadyUsed);
        }
        if entry.is_expired_at(now) {
            return Err(AuthError::CodeExpired);
        }
        entry.consumed_at = Some(now);
        Ok(entry.clone())
    }

    async fn find_code(&self, code: &str) -> AuthResult<Option<AuthorizationCode>> {
        Ok(self.codes.get(code).map(|c| c.value().clone()))
    }
}

// ---- Tokens ----

#[async_trait]
impl TokenStorage for InMemoryStore {
    async fn store_token(&self, mut record: TokenRecord) -> AuthResult<()> {
        let mut grant = self.grants.entry(record.grant_id).or_default();
        if grant.revoked_at.is_some() {
            tracing::warn!(
                grant_id = %record.grant_id,
                "Token issued for revoked grant, storing as revoked"
            );
            record.status = TokenStatus::Revoked;
        }
        grant.tokens.push(record.key.clone());
        self.tokens.insert(record.key.clone(), record);
        Ok(())
    }

    async fn lookup_token(&self, key: &str, now: OffsetDateTime) -> AuthResult<Option<TokenRecord>> {
        match self.tokens.get(key) {
            None => return Ok(None),
            Some(record) if !record.is_expired_at(now) => return Ok(Some(record.clone())),
            Some(_) => {}
        }
        self.tokens.remove_if(key, |_, r| r.is_expired_at(now));
        Ok(None)
    }

    async fn revoke_token(&self, key: &str) -> AuthResult<bool> {
        match self.tokens.get_mut(key) {
            Some(mut record) => {
                record.status = TokenStatus::Revoked;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_chain(&self, key: &str) -> AuthResult<usize> {
        let grant_id = match self.tokens.get(key) {
            Some(record) => record.grant_id,
            None => return Ok(0),
        };
        self.revoke_grant(grant_id).await
    }

    async fn revoke_grant(&self, grant_id: Uuid) -> AuthResult<usize> {
        let mut grant = self.grants.entry(grant_id).or_default();
        grant.revoked_at.get_or_insert_with(OffsetDateTime::now_utc);
        let revoked = self.revoke_keys(&grant.tokens);
        tracing::info!(grant_id = %grant_id, revoked, "Grant revoked");
        Ok(revoked)
    }

    async fn rotate_refresh_token(&self, key: &str, now: OffsetDateTime) -> AuthResult<TokenRecord> {
        let mut record = self
            .tokens
            .get_mut(key)
            .ok_or_else(|| AuthError::invalid_grant("unknown refresh token"))?;
        if record.kind != TokenKind::RefreshToken {
            return Err(AuthError::invalid_grant("not a refresh token"));
        }
        match record.status {
            TokenStatus::Revoked => return Err(AuthError::TokenRevoked),
            TokenStatus::Rotated => return Err(AuthError::RefreshTokenReused),
            TokenStatus::Active => {}
        }
        if record.is_expired_at(now) {
            return Err(AuthError::TokenExpired);
        }
        record.status = TokenStatus::Rotated;
        Ok(record.clone())
    }
}

// ---- Consent, flows, sessions ----

#[async_trait]
impl ConsentStorage for InMemoryStore {
    async fn save_consent(&self, consent: Consent) -> AuthResult<()> {
        let key = (consent.subject.clone(), consent.client_id.clone());
        self.consents.insert(key, consent);
        Ok(())
    }

    async fn find_consent(&self, subject: &str, client_id: &str) -> AuthResult<Option<Consent>> {
        let key = (subject.to_string(), client_id.to_string());
        Ok(self.consents.get(&key).map(|c| c.value().clone()))
    }

    async fn revoke_consent(&self, subject: &str, client_id: &str) -> AuthResult<bool> {
        let key = (subject.to_string(), client_id.to_string());
        Ok(self.consents.remove(&key).is_some())
    }
}

#[async_trait]
impl FlowStorage for InMemoryStore {
    async fn save_flow(&self, flow: AuthorizationFlow) -> AuthResult<()> {
        self.flows.insert(flow.id.clone(), flow);
        Ok(())
    }

    async fn find_flow(&self, id: &str) -> AuthResult<Option<AuthorizationFlow>> {
        Ok(self.flows.get(id).map(|f| f.value().clone()))
    }

    async fn take_flow(&self, id: &str) -> AuthResult<Option<AuthorizationFlow>> {
        Ok(self.flows.remove(id).map(|(_, flow)| flow))
    }
}

#[async_trait]
impl LoginSessionStorage for InMemoryStore {
    async fn save_login_session(&self, session: LoginSession) -> AuthResult<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn find_login_session(
        &self,
        id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<LoginSession>> {
        Ok(self
            .sessions
            .get(id)
            .filter(|s| !s.is_expired_at(now))
            .map(|s| s.value().clone()))
    }

    async fn delete_login_session(&self, id: &str) -> AuthResult<()> {
        self.sessions.remove(id);
        Ok(())
    }
}

// ---- Maintenance ----

#[async_trait]
impl GrantStore for InMemoryStore {
    async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<usize> {
        let before = self.codes.len() + self.tokens.len() + self.flows.len() + self.sessions.len();

        self.codes.retain(|_, c| !c.is_expired_at(now));
        self.tokens.retain(|_, t| !t.is_expired_at(now));
        self.flows.retain(|_, f| !f.is_expired_at(now));
        self.sessions.retain(|_, s| !s.is_expired_at(now));

        let after = self.codes.len() + self.tokens.len() + self.flows.len() + self.sessions.len();

        self.grants.retain(|_, grant| {
            grant.tokens.retain(|key| self.tokens.contains_key(key));
            let tombstone_live = grant
                .revoked_at
                .is_some_and(|at| at + REVOKED_GRANT_RETENTION > now);
            !grant.tokens.is_empty() || tombstone_live
        });

        let removed = before.saturating_sub(after);
        if removed > 0 {
            tracing::debug!(removed, "Purged expired grant store entries");
        }
        Ok(removed)
    }

    async fn flush(&self) -> AuthResult<()> {
        let tokens = self.tokens.len();
        let codes = self.codes.len();
        self.codes.clear();
        self.tokens.clear();
        self.grants.clear();
        self.flows.clear();
        self.sessions.clear();
        self.consents.clear();
        tracing::info!(tokens, codes, "In-memory grant store flushed");
        Ok(())
    }
}
