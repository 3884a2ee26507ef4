//! Authorization service.
//!
//! Drives an authorization request through the state machine:
//!
//! ```text
//! REQUESTED -> CLIENT_VALIDATED -> USER_AUTHENTICATED -> CONSENTED -> CODE_ISSUED
//!                    |                    |                  |
//!                    +--------------------+------------------+--> DENIED / EXPIRED
//! ```
//!
//! # Error delivery
//!
//! Until the client and redirect URI are validated, failures are returned as
//! [`AuthorizeFailure::Direct`] and must be rendered as an error page. After
//! that, every failure goes back to the client as
//! [`AuthorizeFailure::Redirect`].
//!
//! # Usage
//!
//! ```ignore
//! let service = AuthorizationService::new(registry, store, users, tokens, config);
//! match service.begin(&request, cookie.as_deref()).await {
//!     Ok(FlowStep::Login { flow, .. }) => render_login(&flow),
//!     Ok(FlowStep::Consent { flow }) => render_consent(&flow),
//!     Ok(FlowStep::Redirect(redirect)) => found(redirect.location),
//!     Err(AuthorizeFailure::Direct(e)) => error_page(e),
//!     Err(AuthorizeFailure::Redirect(redirect)) => found(redirect.location),
//! }
//! ```

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::AuthResult;
use crate::config::{ProviderConfig, to_time};
use crate::error::AuthError;
use crate::oauth::authorize::{
    AuthorizationRedirect, AuthorizationRequest, Prompt, ResponseMode,
    ValidatedAuthorizationRequest,
};
use crate::oauth::flow::{AuthorizationFlow, FlowState};
use crate::oauth::pkce::CodeChallenge;
use crate::registry::ClientRegistry;
use crate::secret::generate_token;
use crate::storage::GrantStore;
use crate::token::service::{GrantContext, TokenService};
use crate::types::{
    AuthorizationCode, Client, Consent, LoginSession, ResponseType, Scope, scope,
};
use crate::user::UserAuthenticator;

// =============================================================================
// Configuration
// =============================================================================

/// Authorization endpoint settings.
#[derive(Debug, Clone)]
pub struct AuthorizationConfig {
    /// Authorization code lifetime.
    pub code_lifetime: Duration,
    /// Time the end-user has to finish login and consent.
    pub flow_lifetime: Duration,
    /// Browser login session lifetime.
    pub login_session_lifetime: Duration,
    /// Scopes the provider accepts.
    pub scopes_supported: Scope,
}

impl AuthorizationConfig {
    /// Extracts the authorization settings from the provider configuration.
    #[must_use]
    pub fn from_provider(config: &ProviderConfig) -> Self {
        Self {
            code_lifetime: to_time(config.authorization_code_lifetime),
            flow_lifetime: to_time(config.authorization_flow_lifetime),
            login_session_lifetime: to_time(config.login_session_lifetime),
            scopes_supported: config.scopes_supported.iter().cloned().collect(),
        }
    }
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self::from_provider(&ProviderConfig::default())
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Why an authorization request could not continue.
#[derive(Debug)]
pub enum AuthorizeFailure {
    /// The client or redirect URI could not be trusted. Render an error
    /// page; never redirect.
    Direct(AuthError),
    /// Deliver the error to the client's redirect URI.
    Redirect(AuthorizationRedirect),
}

/// What the end-user sees next.
#[derive(Debug)]
pub enum FlowStep {
    /// Ask for credentials.
    Login {
        /// The pending flow.
        flow: AuthorizationFlow,
        /// Message from a failed attempt.
        error: Option<String>,
    },
    /// Ask for approval of the requested scopes.
    Consent {
        /// The pending flow.
        flow: AuthorizationFlow,
    },
    /// The flow finished; send the user agent back to the client.
    Redirect(AuthorizationRedirect),
}

/// Result of a login attempt.
#[derive(Debug)]
pub struct LoginOutcome {
    /// Next step.
    pub step: FlowStep,
    /// Login session created by a successful login.
    pub session: Option<LoginSession>,
}

// =============================================================================
// Service
// =============================================================================

/// Handles `/authorize`: request validation, login, consent and code
/// issuance.
pub struct AuthorizationService {
    registry: ClientRegistry,
    store: Arc<dyn GrantStore>,
    users: Arc<dyn UserAuthenticator>,
    tokens: Arc<TokenService>,
    config: AuthorizationConfig,
}

impl AuthorizationService {
    /// Creates an authorization service.
    #[must_use]
    pub fn new(
        registry: ClientRegistry,
        store: Arc<dyn GrantStore>,
        users: Arc<dyn UserAuthenticator>,
        tokens: Arc<TokenService>,
        config: AuthorizationConfig,
    ) -> Self {
        Self {
            registry,
            store,
            users,
            tokens,
            config,
        }
    }

    /// Validates an authorization request.
    ///
    /// Client and redirect URI failures are [`AuthorizeFailure::Direct`].
    /// A request without `redirect_uri` uses the client's only registered
    /// URI; with several registered it is rejected.
    ///
    /// # Errors
    /// See [`AuthorizeFailure`].
    pub async fn validate(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<(Client, ValidatedAuthorizationRequest), AuthorizeFailure> {
        // ---- Client and redirect URI: failures are never redirected ----
        let client_id = request
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| direct(AuthError::invalid_request("missing client_id parameter")))?;
        let client = self.registry.lookup(client_id).await.map_err(direct)?;

        let (redirect_uri, redirect_uri_explicit) = match request.redirect_uri.as_deref() {
            Some(uri) => {
                self.registry
                    .validate_redirect(client_id, uri)
                    .await
                    .map_err(direct)?;
                (uri.to_string(), true)
            }
            None => match client.redirect_uris.as_slice() {
                [only] => (only.clone(), false),
                _ => {
                    return Err(direct(AuthError::invalid_request(
                        "redirect_uri is required when several are registered",
                    )));
                }
            },
        };

        // ---- Everything else goes back to the client ----
        let state = request.state.as_deref();
        let fail = |mode: ResponseMode, error: AuthError| {
            tracing::warn!(
                client_id = %client_id,
                error = %error,
                "Authorization request rejected"
            );
            AuthorizeFailure::Redirect(AuthorizationRedirect::error(&redirect_uri, mode, &error, state))
        };

        let raw_type = request
            .response_type
            .as_deref()
            .ok_or_else(|| fail(ResponseMode::Query, AuthError::invalid_request("missing response_type parameter")))?;
        let response_type = ResponseType::parse(raw_type)
            .ok_or_else(|| fail(ResponseMode::Query, AuthError::unsupported_response_type(raw_type)))?;
        let mode = ResponseMode::for_response_type(response_type);

        if !client.is_response_type_allowed(response_type)
            || !client.is_grant_type_allowed(response_type.required_grant())
        {
            return Err(fail(
                mode,
                AuthError::unauthorized_client(format!(
                    "client may not use response_type '{}'",
                    response_type.as_str()
                )),
            ));
        }

        let scope = request.scope.as_deref().map(Scope::parse).unwrap_or_default();
        client
            .ensure_scope(&scope, &self.config.scopes_supported)
            .map_err(|e| fail(mode, e))?;

        let nonce = request.nonce.clone().filter(|n| !n.is_empty());
        if response_type.includes_id_token() {
            if !scope.contains(scope::OPENID) {
                return Err(fail(mode, AuthError::invalid_scope("id_token responses require the 'openid' scope")));
            }
            if nonce.is_none() {
                return Err(fail(mode, AuthError::invalid_request("nonce is required for id_token responses")));
            }
        }

        let code_challenge = match request.code_challenge.as_deref() {
            Some(challenge) if response_type == ResponseType::Code => Some(
                CodeChallenge::parse(challenge, request.code_challenge_method.as_deref())
                    .map_err(|e| fail(mode, e.into()))?
                    .into_inner(),
            ),
            _ => None,
        };
        if response_type == ResponseType::Code && code_challenge.is_none() && client.requires_pkce() {
            return Err(fail(mode, AuthError::invalid_request("code_challenge is required for this client")));
        }

        let prompt = Prompt::parse(request.prompt.as_deref()).map_err(|e| fail(mode, e))?;

        tracing::debug!(
            client_id = %client_id,
            response_type = %response_type.as_str(),
            scope = %scope,
            "Authorization request validated"
        );

        let validated = ValidatedAuthorizationRequest {
            client_id: client.client_id.clone(),
            client_name: client.name.clone(),
            redirect_uri,
            redirect_uri_explicit,
            response_type,
            scope,
            state: request.state.clone(),
            nonce,
            code_challenge,
            prompt,
        };
        Ok((client, validated))
    }

    /// Starts an authorization flow.
    ///
    /// A live login session (unless `prompt=login`) satisfies the user step;
    /// stored consent covering the scopes (unless `prompt=consent`)
    /// satisfies the consent step.
    ///
    /// # Errors
    /// See [`AuthorizeFailure`].
    pub async fn begin(
        &self,
        request: &AuthorizationRequest,
        login_session: Option<&str>,
    ) -> Result<FlowStep, AuthorizeFailure> {
        let (_, validated) = self.validate(request).await?;
        let now = OffsetDateTime::now_utc();

        let mut flow = AuthorizationFlow {
            id: generate_token(),
            state: FlowState::Requested,
            request: validated,
            subject: None,
            auth_time: None,
            created_at: now,
            expires_at: now + self.config.flow_lifetime,
        };
        flow.transition(FlowState::ClientValidated).map_err(direct)?;

        if flow.request.prompt != Prompt::Login {
            if let Some(session) = self.live_session(login_session, now).await {
                flow.authenticate(session.subject, session.auth_time)
                    .map_err(|e| fail_flow(&flow, e))?;
            }
        }

        self.proceed(flow).await
    }

    /// Authenticates the end-user of a pending flow.
    ///
    /// Wrong credentials leave the flow pending and ask again.
    ///
    /// # Errors
    /// `Direct(FlowExpired)` for unknown or expired flows.
    pub async fn login(&self, flow_id: &str, username: &str, password: &str) -> Result<LoginOutcome, AuthorizeFailure> {
        let mut flow = self.claim_flow(flow_id).await?;
        if flow.state != FlowState::ClientValidated {
            return Err(self.release(flow, AuthError::invalid_request("the flow is not waiting for a login")).await);
        }

        let user = self
            .users
            .authenticate(username, password)
            .await
            .map_err(|e| fail_flow(&flow, e))?;
        let Some(user) = user else {
            tracing::warn!(client_id = %flow.request.client_id, "End-user login failed");
            self.store.save_flow(flow.clone()).await.map_err(|e| fail_flow(&flow, e))?;
            return Ok(LoginOutcome {
                step: FlowStep::Login {
                    flow,
                    error: Some(AuthError::LoginFailed.to_string()),
                },
                session: None,
            });
        };

        let now = OffsetDateTime::now_utc();
        let session = LoginSession {
            id: generate_token(),
            subject: user.subject.clone(),
            auth_time: now,
            expires_at: now + self.config.login_session_lifetime,
        };
        self.store
            .save_login_session(session.clone())
            .await
            .map_err(|e| fail_flow(&flow, e))?;
        flow.authenticate(user.subject, now).map_err(|e| fail_flow(&flow, e))?;
        tracing::info!(client_id = %flow.request.client_id, subject = %session.subject, "End-user authenticated");

        let step = self.proceed(flow).await?;
        Ok(LoginOutcome {
            step,
            session: Some(session),
        })
    }

    /// Records the end-user's approval and completes the flow.
    ///
    /// # Errors
    /// `Direct(FlowExpired)` for unknown or expired flows.
    pub async fn approve(&self, flow_id: &str) -> Result<AuthorizationRedirect, AuthorizeFailure> {
        let mut flow = self.claim_flow(flow_id).await?;
        let Some(subject) = flow.subject.clone().filter(|_| flow.state == FlowState::UserAuthenticated) else {
            return Err(self.release(flow, AuthError::invalid_request("the flow is not waiting for consent")).await);
        };

        let existing = self
            .store
            .find_consent(&subject, &flow.request.client_id)
            .await
            .map_err(|e| fail_flow(&flow, e))?;
        let scope: Scope = match existing {
            Some(consent) => consent.scope.iter().chain(flow.request.scope.iter()).collect(),
            None => flow.request.scope.clone(),
        };
        self.store
            .save_consent(Consent {
                subject,
                client_id: flow.request.client_id.clone(),
                scope,
                granted_at: OffsetDateTime::now_utc(),
            })
            .await
            .map_err(|e| fail_flow(&flow, e))?;

        flow.transition(FlowState::Consented).map_err(|e| fail_flow(&flow, e))?;
        self.complete(flow).await
    }

    /// Ends a flow because the end-user declined.
    ///
    /// # Errors
    /// `Direct(FlowExpired)` for unknown or expired flows.
    pub async fn deny(&self, flow_id: &str) -> Result<AuthorizationRedirect, AuthorizeFailure> {
        let mut flow = self.claim_flow(flow_id).await?;
        flow.transition(FlowState::Denied).map_err(direct)?;
        tracing::info!(client_id = %flow.request.client_id, "Authorization denied by end-user");
        Ok(flow
            .request
            .error_redirect(&AuthError::access_denied("the end-user denied the request")))
    }

    /// Ends a browser login session.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    pub async fn logout(&self, login_session: &str) -> AuthResult<()> {
        self.store.delete_login_session(login_session).await
    }

    // ---- Internal ----

    async fn live_session(&self, id: Option<&str>, now: OffsetDateTime) -> Option<LoginSession> {
        let id = id?;
        match self.store.find_login_session(id, now).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load login session");
                None
            }
        }
    }

    /// Moves the flow forward as far as it can go without the end-user.
    async fn proceed(&self, mut flow: AuthorizationFlow) -> Result<FlowStep, AuthorizeFailure> {
        let prompt = flow.request.prompt;

        let Some(subject) = flow.subject.clone() else {
            if prompt == Prompt::None {
                return Err(self.abandon(flow, AuthError::LoginRequired));
            }
            self.store.save_flow(flow.clone()).await.map_err(|e| fail_flow(&flow, e))?;
            return Ok(FlowStep::Login { flow, error: None });
        };

        let consent = self
            .store
            .find_consent(&subject, &flow.request.client_id)
            .await
            .map_err(|e| fail_flow(&flow, e))?;
        let covered = consent.is_some_and(|c| c.covers(&flow.request.scope));

        if covered && prompt != Prompt::Consent {
            flow.transition(FlowState::Consented).map_err(|e| fail_flow(&flow, e))?;
            tracing::debug!(client_id = %flow.request.client_id, subject = %subject, "Stored consent reused");
            return self.complete(flow).await.map(FlowStep::Redirect);
        }
        if prompt == Prompt::None {
            return Err(self.abandon(flow, AuthError::ConsentRequired));
        }

        self.store.save_flow(flow.clone()).await.map_err(|e| fail_flow(&flow, e))?;
        Ok(FlowStep::Consent { flow })
    }

    /// Issues the code or implicit tokens of a consented flow. The flow is
    /// no longer in the store: it is either new or was claimed.
    async fn complete(&self, mut flow: AuthorizationFlow) -> Result<AuthorizationRedirect, AuthorizeFailure> {
        let now = OffsetDateTime::now_utc();
        let request = flow.request.clone();
        let (Some(subject), Some(auth_time)) = (flow.subject.clone(), flow.auth_time) else {
            return Err(fail_flow(&flow, AuthError::internal("consented flow without a subject")));
        };
        let grant_id = Uuid::new_v4();

        if request.response_type == ResponseType::Code {
            let code = generate_token();
            self.store
                .issue_code(AuthorizationCode {
                    code: code.clone(),
                    grant_id,
                    client_id: request.client_id.clone(),
                    subject: subject.clone(),
                    redirect_uri: request.redirect_uri.clone(),
                    redirect_uri_explicit: request.redirect_uri_explicit,
                    scope: request.scope.clone(),
                    nonce: request.nonce.clone(),
                    code_challenge: request.code_challenge.clone(),
                    auth_time,
                    created_at: now,
                    expires_at: now + self.config.code_lifetime,
                    consumed_at: None,
                })
                .await
                .map_err(|e| fail_flow(&flow, e))?;
            flow.transition(FlowState::CodeIssued).map_err(|e| fail_flow(&flow, e))?;

            tracing::info!(
                client_id = %request.client_id,
                subject = %subject,
                grant_id = %grant_id,
                "Authorization code issued"
            );
            return Ok(AuthorizationRedirect::code(
                &request.redirect_uri,
                &code,
                request.state.as_deref(),
            ));
        }

        let grant = GrantContext {
            grant_id,
            client_id: request.client_id.clone(),
            subject,
            scope: request.scope.clone(),
            auth_time: Some(auth_time),
            nonce: request.nonce.clone(),
            parent: None,
        };
        let tokens = self
            .tokens
            .issue_implicit(
                &grant,
                request.response_type.includes_access_token(),
                request.response_type.includes_id_token(),
            )
            .await
            .map_err(|e| fail_flow(&flow, e))?;
        flow.transition(FlowState::TokenIssued).map_err(|e| fail_flow(&flow, e))?;

        let expires_in = tokens.expires_in.map(|s| s.to_string());
        let scope = request.scope.to_string();
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(access_token) = tokens.access_token.as_deref() {
            params.push(("access_token", access_token));
            params.push(("token_type", "Bearer"));
        }
        if let Some(expires_in) = expires_in.as_deref() {
            params.push(("expires_in", expires_in));
        }
        if let Some(id_token) = tokens.id_token.as_deref() {
            params.push(("id_token", id_token));
        }
        params.push(("scope", scope.as_str()));
        if let Some(state) = request.state.as_deref() {
            params.push(("state", state));
        }
        Ok(AuthorizationRedirect::build(
            &request.redirect_uri,
            ResponseMode::Fragment,
            &params,
        ))
    }

    /// Removes a pending flow from the store for exclusive use by the
    /// caller. Concurrent interactions on one flow see `FlowExpired`.
    async fn claim_flow(&self, flow_id: &str) -> Result<AuthorizationFlow, AuthorizeFailure> {
        let mut flow = self
            .store
            .take_flow(flow_id)
            .await
            .map_err(direct)?
            .ok_or_else(|| direct(AuthError::FlowExpired))?;

        if flow.is_expired_at(OffsetDateTime::now_utc()) {
            flow.transition(FlowState::Expired).map_err(direct)?;
            tracing::info!(client_id = %flow.request.client_id, "Authorization flow expired");
            return Err(direct(AuthError::FlowExpired));
        }
        Ok(flow)
    }

    /// Puts a claimed flow back unchanged and reports `error` directly.
    async fn release(&self, flow: AuthorizationFlow, error: AuthError) -> AuthorizeFailure {
        if let Err(e) = self.store.save_flow(flow.clone()).await {
            return fail_flow(&flow, e);
        }
        direct(error)
    }

    /// Ends the flow as DENIED and redirects `error` to the client.
    fn abandon(&self, mut flow: AuthorizationFlow, error: AuthError) -> AuthorizeFailure {
        if let Err(e) = flow.transition(FlowState::Denied) {
            return fail_flow(&flow, e);
        }
        tracing::debug!(client_id = %flow.request.client_id, error = %error, "Authorization flow abandoned");
        AuthorizeFailure::Redirect(flow.request.error_redirect(&error))
    }
}

fn direct(error: AuthError) -> AuthorizeFailure {
    if error.is_server_error() {
        tracing::error!(error = %error, "Authorization request failed");
    } else {
        tracing::warn!(error = %error, "Authorization request rejected");
    }
    AuthorizeFailure::Direct(error)
}

fn fail_flow(flow: &AuthorizationFlow, error: AuthError) -> AuthorizeFailure {
    if error.is_server_error() {
        tracing::error!(client_id = %flow.request.client_id, error = %error, "Authorization flow failed");
    }
    AuthorizeFailure::Redirect(flow.request.error_redirect(&error))
}
