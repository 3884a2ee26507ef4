//! Storage traits for clients, grants and sessions.
//!
//! Every trait is object safe and used behind `Arc<dyn ...>`. Operations
//! that move a record from one state to another (code redemption, refresh
//! token rotation, flow completion) must be atomic per record: concurrent
//! callers observe exactly one winner.
//!
//! Entries carry their own expiry. Expired entries are inert for lookups;
//! [`GrantStore::purge_expired`] removes them for good.
//!
//! # Implementations
//!
//! - [`InMemoryStore`] - process-local store built on `DashMap`

pub mod memory;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::oauth::flow::AuthorizationFlow;
use crate::types::{AuthorizationCode, Client, Consent, LoginSession, TokenRecord};

pub use memory::InMemoryStore;

// =============================================================================
// Client Storage
// =============================================================================

/// Storage operations for registered clients.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Inserts a new client.
    ///
    /// # Errors
    /// `DuplicateClient` if the `client_id` is taken.
    async fn insert_client(&self, client: Client) -> AuthResult<()>;

    /// Finds a client by `client_id`.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn find_client(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Replaces an existing client.
    ///
    /// # Errors
    /// `UnknownClient` if no client has this `client_id`.
    async fn replace_client(&self, client: Client) -> AuthResult<()>;

    /// Removes a client. Returns `false` if it did not exist.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn delete_client(&self, client_id: &str) -> AuthResult<bool>;

    /// Lists every client, ordered by `client_id`.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn list_clients(&self) -> AuthResult<Vec<Client>>;
}

// =============================================================================
// Code Storage
// =============================================================================

/// Storage operations for authorization codes.
#[async_trait]
pub trait CodeStorage: Send + Sync {
    /// Stores a freshly minted code.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn issue_code(&self, code: AuthorizationCode) -> AuthResult<()>;

    /// Atomically marks a code consumed and returns it.
    ///
    /// Checks in order: existence (`CodeNotFound`), prior redemption
    /// (`CodeAlreadyUsed`), expiry (`CodeExpired`). Exactly one of any number
    /// of concurrent callers succeeds.
    ///
    /// # Errors
    /// `CodeNotFound`, `CodeAlreadyUsed` or `CodeExpired`.
    async fn redeem_code(&self, code: &str, now: OffsetDateTime) -> AuthResult<AuthorizationCode>;

    /// Reads a code without consuming it, whatever its state.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn find_code(&self, code: &str) -> AuthResult<Option<AuthorizationCode>>;
}

// =============================================================================
// Token Storage
// =============================================================================

/// Storage operations for issued access and refresh tokens.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Stores an issued token and indexes it under its grant. A token whose
    /// grant was revoked in the meantime is stored already revoked.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn store_token(&self, record: TokenRecord) -> AuthResult<()>;

    /// Looks up a token by store key. Expired tokens are not returned;
    /// revoked and rotated ones are, with their status.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn lookup_token(&self, key: &str, now: OffsetDateTime) -> AuthResult<Option<TokenRecord>>;

    /// Revokes a single token. Returns `false` if it was unknown.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn revoke_token(&self, key: &str) -> AuthResult<bool>;

    /// Revokes every token of the grant `key` belongs to. Returns the number
    /// of tokens revoked.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn revoke_chain(&self, key: &str) -> AuthResult<usize>;

    /// Revokes every token of a grant, including tokens stored after this
    /// call. Returns the number of tokens revoked.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn revoke_grant(&self, grant_id: Uuid) -> AuthResult<usize>;

    /// Atomically moves an active refresh token to `Rotated` and returns it.
    ///
    /// # Errors
    /// - `InvalidGrant` if the token is unknown or not a refresh token
    /// - `TokenRevoked` if it was revoked
    /// - `RefreshTokenReused` if it was already rotated
    /// - `TokenExpired` if it expired
    async fn rotate_refresh_token(&self, key: &str, now: OffsetDateTime) -> AuthResult<TokenRecord>;
}

// =============================================================================
// Consent, Flow and Session Storage
// =============================================================================

/// Storage operations for remembered consent.
#[async_trait]
pub trait ConsentStorage: Send + Sync {
    /// Creates or replaces the consent for `(subject, client_id)`.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn save_consent(&self, consent: Consent) -> AuthResult<()>;

    /// Finds the consent an end-user gave a client.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn find_consent(&self, subject: &str, client_id: &str) -> AuthResult<Option<Consent>>;

    /// Forgets consent. Returns `false` if none was stored.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn revoke_consent(&self, subject: &str, client_id: &str) -> AuthResult<bool>;
}

/// Storage operations for pending interactive authorization flows.
#[async_trait]
pub trait FlowStorage: Send + Sync {
    /// Creates or replaces a flow.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn save_flow(&self, flow: AuthorizationFlow) -> AuthResult<()>;

    /// Reads a flow, expired or not; the caller decides what expiry means.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn find_flow(&self, id: &str) -> AuthResult<Option<AuthorizationFlow>>;

    /// Atomically removes and returns a flow.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn take_flow(&self, id: &str) -> AuthResult<Option<AuthorizationFlow>>;
}

/// Storage operations for browser login sessions.
#[async_trait]
pub trait LoginSessionStorage: Send + Sync {
    /// Stores a login session.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn save_login_session(&self, session: LoginSession) -> AuthResult<()>;

    /// Finds an unexpired login session.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn find_login_session(
        &self,
        id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<LoginSession>>;

    /// Ends a login session.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn delete_login_session(&self, id: &str) -> AuthResult<()>;
}

// =============================================================================
// Grant Store
// =============================================================================

/// Everything the authorization and token services persist.
#[async_trait]
pub trait GrantStore:
    CodeStorage + TokenStorage + ConsentStorage + FlowStorage + LoginSessionStorage
{
    /// Removes expired codes, tokens, flows and sessions. Returns the number
    /// of entries removed.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<usize>;

    /// Writes out pending state and drops every grant.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn flush(&self) -> AuthResult<()>;
}
