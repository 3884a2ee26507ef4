//! Token issuance, verification and revocation.
//!
//! ```ignore
//! let service = TokenService::new(keys, store, TokenConfig::from_provider(&config));
//! let response = service.exchange_code(&client, &request).await?;
//! ```
//!
//! Every token belongs to a grant (`grant_id`). Access tokens are JWTs stored
//! by `jti`; refresh tokens are opaque and stored by SHA-256 digest only.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::introspection::IntrospectionResponse;
use super::jwt::{AccessTokenClaims, IdTokenClaims};
use super::keyring::KeyRing;
use super::revocation::TokenTypeHint;
use crate::AuthResult;
use crate::config::{ProviderConfig, to_time};
use crate::error::AuthError;
use crate::oauth::flow::FlowState;
use crate::oauth::pkce::verify_code_verifier;
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::secret::{generate_token, hash_token};
use crate::storage::GrantStore;
use crate::types::{
    AuthorizationCode, Client, GrantType, Scope, TokenKind, TokenRecord, TokenStatus, scope,
};

// =============================================================================
// Configuration
// =============================================================================

/// Token lifetimes and issuance policy.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Access token lifetime.
    pub access_token_lifetime: Duration,
    /// Refresh token lifetime.
    pub refresh_token_lifetime: Duration,
    /// ID token lifetime.
    pub id_token_lifetime: Duration,
    /// One-time-use refresh tokens.
    pub refresh_token_rotation: bool,
    /// Scopes the provider accepts.
    pub scopes_supported: Scope,
}

impl TokenConfig {
    /// Extracts the token settings from the provider configuration.
    #[must_use]
    pub fn from_provider(config: &ProviderConfig) -> Self {
        Self {
            access_token_lifetime: to_time(config.access_token_lifetime),
            refresh_token_lifetime: to_time(config.refresh_token_lifetime),
            id_token_lifetime: to_time(config.id_token_lifetime),
            refresh_token_rotation: config.refresh_token_rotation,
            scopes_supported: config.scopes_supported.iter().cloned().collect(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::from_provider(&ProviderConfig::default())
    }
}

// =============================================================================
// Issuance Context
// =============================================================================

/// What a set of tokens is issued for.
#[derive(Debug, Clone)]
pub struct GrantContext {
    /// Grant family.
    pub grant_id: Uuid,
    /// Client the tokens are issued to.
    pub client_id: String,
    /// Subject (`sub`).
    pub subject: String,
    /// Granted scope.
    pub scope: Scope,
    /// When the end-user authenticated.
    pub auth_time: Option<OffsetDateTime>,
    /// Nonce for the ID token.
    pub nonce: Option<String>,
    /// Store key of the token these derive from.
    pub parent: Option<String>,
}

impl GrantContext {
    fn from_code(code: &AuthorizationCode) -> Self {
        Self {
            grant_id: code.grant_id,
            client_id: code.client_id.clone(),
            subject: code.subject.clone(),
            scope: code.scope.clone(),
            auth_time: Some(code.auth_time),
            nonce: code.nonce.clone(),
            parent: None,
        }
    }
}

/// Tokens returned directly from the authorization endpoint.
#[derive(Debug, Clone, Default)]
pub struct ImplicitTokens {
    /// Access token, for `token` response types.
    pub access_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: Option<u64>,
    /// ID token, for `id_token` response types.
    pub id_token: Option<String>,
}

/// A verified bearer access token.
#[derive(Debug, Clone)]
pub struct VerifiedAccessToken {
    /// Decoded claims.
    pub claims: AccessTokenClaims,
    /// Store record.
    pub record: TokenRecord,
}

// =============================================================================
// Token Service
// =============================================================================

/// Mints, verifies and revokes tokens.
pub struct TokenService {
    keys: Arc<KeyRing>,
    store: Arc<dyn GrantStore>,
    config: TokenConfig,
}

impl TokenService {
    /// Creates a token service.
    #[must_use]
    pub fn new(keys: Arc<KeyRing>, store: Arc<dyn GrantStore>, config: TokenConfig) -> Self {
        Self {
            keys,
            store,
            config,
        }
    }

    /// The key ring tokens are signed with.
    #[must_use]
    pub fn keys(&self) -> &Arc<KeyRing> {
        &self.keys
    }

    /// Token settings.
    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    // ---- Grants ----

    /// Exchanges an authorization code for tokens.
    ///
    /// The code is consumed atomically. Presenting an already consumed code
    /// revokes every token issued from it.
    ///
    /// # Errors
    /// - `InvalidRequest` for missing parameters
    /// - `UnauthorizedClient` if the client may not use this grant
    /// - `CodeNotFound`, `CodeExpired`, `CodeAlreadyUsed`
    /// - `InvalidGrant` for a client or redirect URI mismatch
    /// - `PkceVerificationFailed` for a wrong verifier
    pub async fn exchange_code(&self, client: &Client, request: &TokenRequest) -> AuthResult<TokenResponse> {
        if !client.is_grant_type_allowed(GrantType::AuthorizationCode) {
            return Err(AuthError::unauthorized_client(
                "client may not use the authorization_code grant",
            ));
        }
        let code_value = request
            .code
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("missing code parameter"))?;

        // A code belonging to another client is left untouched.
        if let Some(peek) = self.store.find_code(code_value).await? {
            if peek.client_id != client.client_id {
                tracing::warn!(client_id = %client.client_id, "Code presented by another client");
                return Err(AuthError::invalid_grant("code was issued to another client"));
            }
        }

        let now = OffsetDateTime::now_utc();
        let code = match self.store.redeem_code(code_value, now).await {
            Ok(code) => code,
            Err(AuthError::CodeAlreadyUsed) => {
                self.revoke_replayed_code(code_value).await;
                return Err(AuthError::CodeAlreadyUsed);
            }
            Err(e) => return Err(e),
        };

        match request.redirect_uri.as_deref() {
            Some(uri) if uri != code.redirect_uri => {
                return Err(AuthError::invalid_grant(
                    "redirect_uri does not match the authorization request",
                ));
            }
            None if code.redirect_uri_explicit => {
                return Err(AuthError::invalid_request("missing redirect_uri parameter"));
            }
            _ => {}
        }

        verify_code_verifier(code.code_challenge.as_deref(), request.code_verifier.as_deref())?;

        FlowState::CodeIssued.advance(FlowState::TokenIssued)?;
        let grant = GrantContext::from_code(&code);
        let refresh_scope = client
            .is_grant_type_allowed(GrantType::RefreshToken)
            .then_some(&grant.scope);
        let response = self.issue(&grant, refresh_scope, now).await?;

        tracing::info!(
            client_id = %client.client_id,
            grant_id = %code.grant_id,
            refresh = response.refresh_token.is_some(),
            "Authorization code exchanged"
        );
        Ok(response)
    }

    async fn revoke_replayed_code(&self, code_value: &str) {
        match self.store.find_code(code_value).await {
            Ok(Some(code)) => {
                tracing::warn!(
                    client_id = %code.client_id,
                    grant_id = %code.grant_id,
                    "Authorization code replay, revoking grant"
                );
                if let Err(e) = self.store.revoke_grant(code.grant_id).await {
                    tracing::error!(error = %e, grant_id = %code.grant_id, "Failed to revoke replayed grant");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Failed to look up replayed code"),
        }
    }

    /// Exchanges a refresh token for a new access token and, with rotation,
    /// a new refresh token.
    ///
    /// With rotation enabled the presented token can be used once. Presenting
    /// it again revokes the whole grant.
    ///
    /// # Errors
    /// - `InvalidRequest` for a missing refresh token
    /// - `UnauthorizedClient` if the client may not refresh
    /// - `InvalidGrant` for unknown, expired or foreign tokens
    /// - `InvalidScope` when asking for more than was granted
    /// - `RefreshTokenReused`, `TokenRevoked`
    pub async fn refresh(&self, client: &Client, request: &TokenRequest) -> AuthResult<TokenResponse> {
        if !client.is_grant_type_allowed(GrantType::RefreshToken) {
            return Err(AuthError::unauthorized_client(
                "client may not use the refresh_token grant",
            ));
        }
        let presented = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::invalid_request("missing refresh_token parameter"))?;

        let now = OffsetDateTime::now_utc();
        let key = hash_token(presented);
        let record = self
            .store
            .lookup_token(&key, now)
            .await?
            .filter(|r| r.kind == TokenKind::RefreshToken)
            .ok_or_else(|| AuthError::invalid_grant("refresh token is invalid or expired"))?;

        if record.client_id != client.client_id {
            tracing::warn!(client_id = %client.client_id, "Refresh token presented by another client");
            return Err(AuthError::invalid_grant("refresh token was issued to another client"));
        }

        let scope = match request.scope.as_deref() {
            Some(raw) => {
                let requested = Scope::parse(raw);
                if !requested.is_subset(&record.scope) {
                    return Err(AuthError::invalid_scope(
                        "requested scope exceeds the original grant",
                    ));
                }
                requested
            }
            None => record.scope.clone(),
        };

        let record = if self.config.refresh_token_rotation {
            match self.store.rotate_refresh_token(&key, now).await {
                Ok(record) => record,
                Err(AuthError::RefreshTokenReused) => {
                    tracing::warn!(
                        client_id = %client.client_id,
                        grant_id = %record.grant_id,
                        "Refresh token reuse, revoking grant"
                    );
                    self.store.revoke_grant(record.grant_id).await?;
                    return Err(AuthError::RefreshTokenReused);
                }
                Err(e) => return Err(e),
            }
        } else if record.status == TokenStatus::Active {
            record
        } else {
            return Err(AuthError::TokenRevoked);
        };

        let grant = GrantContext {
            grant_id: record.grant_id,
            client_id: record.client_id.clone(),
            subject: record.subject.clone(),
            scope,
            auth_time: record.auth_time,
            nonce: None,
            parent: Some(key),
        };
        let mut response = self
            .issue(
                &grant,
                self.config.refresh_token_rotation.then_some(&record.scope),
                now,
            )
            .await?;
        if !self.config.refresh_token_rotation {
            response.refresh_token = Some(presented.to_string());
        }

        tracing::info!(client_id = %client.client_id, grant_id = %record.grant_id, "Tokens refreshed");
        Ok(response)
    }

    /// Issues an access token to a confidential client acting for itself.
    ///
    /// No refresh token or ID token is issued.
    ///
    /// # Errors
    /// `UnauthorizedClient` for public clients or clients without the grant,
    /// `InvalidScope` for scopes outside the client's permissions.
    pub async fn client_credentials(
        &self,
        client: &Client,
        request: &TokenRequest,
    ) -> AuthResult<TokenResponse> {
        let state = FlowState::Requested.advance(FlowState::ClientValidated)?;
        if !client.is_confidential() || !client.is_grant_type_allowed(GrantType::ClientCredentials) {
            state.advance(FlowState::Denied)?;
            return Err(AuthError::unauthorized_client(
                "client may not use the client_credentials grant",
            ));
        }

        let scope = match request.scope.as_deref() {
            Some(raw) => Scope::parse(raw),
            None => client.scopes.iter().cloned().collect(),
        };
        client.ensure_scope(&scope, &self.config.scopes_supported)?;
        if scope.contains(scope::OPENID) {
            return Err(AuthError::invalid_scope(
                "'openid' requires an end-user and cannot be used with client_credentials",
            ));
        }

        state.advance(FlowState::TokenIssued)?;
        let now = OffsetDateTime::now_utc();
        let grant = GrantContext {
            grant_id: Uuid::new_v4(),
            client_id: client.client_id.clone(),
            subject: client.client_id.clone(),
            scope,
            auth_time: None,
            nonce: None,
            parent: None,
        };
        let response = self.issue(&grant, None, now).await?;

        tracing::info!(client_id = %client.client_id, "Client credentials token issued");
        Ok(response)
    }

    /// Issues the tokens of an implicit response (`token`, `id_token`,
    /// `id_token token`).
    ///
    /// # Errors
    /// Returns an error if signing or storage fails.
    pub async fn issue_implicit(
        &self,
        grant: &GrantContext,
        access_token: bool,
        id_token: bool,
    ) -> AuthResult<ImplicitTokens> {
        let now = OffsetDateTime::now_utc();
        let mut tokens = ImplicitTokens::default();

        if access_token {
            let (token, expires_in) = self.mint_access_token(grant, now).await?;
            tokens.access_token = Some(token);
            tokens.expires_in = Some(expires_in);
        }
        if id_token {
            tokens.id_token = Some(self.mint_id_token(grant, tokens.access_token.as_deref(), now)?);
        }

        tracing::info!(
            client_id = %grant.client_id,
            grant_id = %grant.grant_id,
            access_token,
            id_token,
            "Implicit tokens issued"
        );
        Ok(tokens)
    }

    // ---- Protected resources ----

    /// Verifies a bearer access token: signature, issuer, expiry and store
    /// status.
    ///
    /// # Errors
    /// `Signing` for verification failures, `InvalidToken` for unknown or
    /// revoked tokens.
    pub async fn verify_access_token(&self, token: &str) -> AuthResult<VerifiedAccessToken> {
        let claims: AccessTokenClaims = self.keys.verify(token)?;
        let record = self
            .store
            .lookup_token(&claims.jti, OffsetDateTime::now_utc())
            .await?
            .filter(|r| r.kind == TokenKind::AccessToken)
            .ok_or_else(|| AuthError::invalid_token("token is not known"))?;

        if record.status != TokenStatus::Active {
            return Err(AuthError::invalid_token("token has been revoked"));
        }
        Ok(VerifiedAccessToken { claims, record })
    }

    /// Revokes a token (RFC 7009). Revoking a refresh token revokes its
    /// whole grant; revoking an access token revokes only that token.
    ///
    /// Unknown tokens and tokens of other clients are silently ignored.
    ///
    /// # Errors
    /// Returns an error only if storage fails.
    pub async fn revoke(&self, client: &Client, token: &str, hint: Option<TokenTypeHint>) -> AuthResult<()> {
        let now = OffsetDateTime::now_utc();
        for kind in TokenTypeHint::search_order(hint) {
            let Some(record) = self.find_token(token, kind, now).await? else {
                continue;
            };
            if record.client_id != client.client_id {
                tracing::warn!(client_id = %client.client_id, "Revocation of another client's token ignored");
                return Ok(());
            }
            match kind {
                TokenKind::RefreshToken => {
                    let revoked = self.store.revoke_chain(&record.key).await?;
                    tracing::info!(client_id = %client.client_id, grant_id = %record.grant_id, revoked, "Refresh token revoked");
                }
                TokenKind::AccessToken => {
                    self.store.revoke_token(&record.key).await?;
                    tracing::info!(client_id = %client.client_id, "Access token revoked");
                }
            }
            return Ok(());
        }
        Ok(())
    }

    /// Describes a token (RFC 7662).
    ///
    /// # Errors
    /// Returns an error only if storage fails.
    pub async fn introspect(&self, token: &str, hint: Option<TokenTypeHint>) -> AuthResult<IntrospectionResponse> {
        let now = OffsetDateTime::now_utc();
        for kind in TokenTypeHint::search_order(hint) {
            let Some(record) = self.find_token(token, kind, now).await? else {
                continue;
            };
            if !record.is_usable_at(now) {
                return Ok(IntrospectionResponse::inactive());
            }
            return Ok(IntrospectionResponse {
                active: true,
                scope: Some(record.scope.to_string()),
                client_id: Some(record.client_id.clone()),
                sub: Some(record.subject.clone()),
                token_type: Some(kind.as_hint().to_string()),
                exp: Some(record.expires_at.unix_timestamp()),
                iat: Some(record.issued_at.unix_timestamp()),
                iss: Some(self.keys.issuer().to_string()),
                jti: (kind == TokenKind::AccessToken).then(|| record.key.clone()),
            });
        }
        Ok(IntrospectionResponse::inactive())
    }

    async fn find_token(&self, token: &str, kind: TokenKind, now: OffsetDateTime) -> AuthResult<Option<TokenRecord>> {
        let key = match kind {
            TokenKind::RefreshToken => hash_token(token),
            TokenKind::AccessToken => match self.keys.verify::<AccessTokenClaims>(token) {
                Ok(claims) => claims.jti,
                Err(_) => return Ok(None),
            },
        };
        Ok(self
            .store
            .lookup_token(&key, now)
            .await?
            .filter(|r| r.kind == kind))
    }

    // ---- Minting ----

    /// Mints an access token (and ID token for `openid`) for `grant.scope`,
    /// plus a refresh token carrying `refresh_scope` when given.
    async fn issue(
        &self,
        grant: &GrantContext,
        refresh_scope: Option<&Scope>,
        now: OffsetDateTime,
    ) -> AuthResult<TokenResponse> {
        let (access_token, expires_in) = self.mint_access_token(grant, now).await?;
        let mut response = TokenResponse::bearer(access_token, expires_in);
        response.scope = (!grant.scope.is_empty()).then(|| grant.scope.to_string());

        if let Some(refresh_scope) = refresh_scope {
            let refresh_token = generate_token();
            self.store
                .store_token(TokenRecord {
                    key: hash_token(&refresh_token),
                    kind: TokenKind::RefreshToken,
                    grant_id: grant.grant_id,
                    parent: grant.parent.clone(),
                    client_id: grant.client_id.clone(),
                    subject: grant.subject.clone(),
                    scope: refresh_scope.clone(),
                    auth_time: grant.auth_time,
                    issued_at: now,
                    expires_at: now + self.config.refresh_token_lifetime,
                    status: TokenStatus::Active,
                })
                .await?;
            response.refresh_token = Some(refresh_token);
        }

        if grant.scope.contains(scope::OPENID) {
            response.id_token = Some(self.mint_id_token(grant, Some(&response.access_token), now)?);
        }
        Ok(response)
    }

    async fn mint_access_token(&self, grant: &GrantContext, now: OffsetDateTime) -> AuthResult<(String, u64)> {
        let lifetime = self.config.access_token_lifetime;
        let claims = AccessTokenClaims {
            iss: self.keys.issuer().to_string(),
            sub: grant.subject.clone(),
            aud: grant.client_id.clone(),
            exp: (now + lifetime).unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
            scope: grant.scope.to_string(),
            client_id: grant.client_id.clone(),
        };
        let token = self.keys.sign(&claims, None)?;

        self.store
            .store_token(TokenRecord {
                key: claims.jti.clone(),
                kind: TokenKind::AccessToken,
                grant_id: grant.grant_id,
                parent: grant.parent.clone(),
                client_id: grant.client_id.clone(),
                subject: grant.subject.clone(),
                scope: grant.scope.clone(),
                auth_time: grant.auth_time,
                issued_at: now,
                expires_at: now + lifetime,
                status: TokenStatus::Active,
            })
            .await?;

        let expires_in = u64::try_from(lifetime.whole_seconds()).unwrap_or(0);
        Ok((token, expires_in))
    }

    fn mint_id_token(&self, grant: &GrantContext, access_token: Option<&str>, now: OffsetDateTime) -> AuthResult<String> {
        let claims = IdTokenClaims {
            iss: self.keys.issuer().to_string(),
            sub: grant.subject.clone(),
            aud: grant.client_id.clone(),
            exp: (now + self.config.id_token_lifetime).unix_timestamp(),
            iat: now.unix_timestamp(),
            auth_time: grant.auth_time.map(OffsetDateTime::unix_timestamp),
            nonce: grant.nonce.clone(),
            at_hash: access_token.map(|t| self.keys.algorithm().half_hash(t)),
        };
        Ok(self.keys.sign(&claims, None)?)
    }
}
