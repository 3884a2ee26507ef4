//! # oidc-provider
//!
//! An OpenID Connect / OAuth 2.0 authorization server core.
//!
//! This crate provides:
//! - Authorization code flow with PKCE, login and consent
//! - Implicit `id_token` and `id_token token` responses
//! - Refresh token rotation with replay detection
//! - Client credentials, revocation (RFC 7009) and introspection (RFC 7662)
//! - Signed JWT access and ID tokens with key rotation and a JWKS
//! - Axum handlers for every endpoint, including discovery
//!
//! ## Overview
//!
//! A [`Provider`] owns the grant store, the client registry, the key ring
//! and the services built on them. Wrap it in an `Arc`, hand it to
//! [`http::OidcState`], and mount [`http::router`] under the issuer's path.
//!
//! ```ignore
//! let provider = Arc::new(Provider::init(ProviderConfig::default()).await?);
//! provider.spawn_maintenance();
//! let app = http::router(http::OidcState::new(provider.clone()));
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Provider configuration
//! - [`error`] - Error taxonomy and OAuth error codes
//! - [`oauth`] - Authorization endpoint logic and protocol types
//! - [`token`] - Signing keys, token issuance and verification
//! - [`storage`] - Grant store traits and the in-memory store
//! - [`registry`] - Client registration and authentication
//! - [`user`] - End-user authentication
//! - [`http`] - Axum HTTP handlers
//! - [`provider`] - Provider lifecycle

pub mod config;
pub mod error;
pub mod http;
pub mod oauth;
pub mod provider;
pub mod registry;
pub mod secret;
pub mod storage;
pub mod token;
pub mod types;
pub mod user;

pub use config::{ConfigError, ProviderConfig, SigningConfig};
pub use error::{AuthError, ErrorCategory};
pub use provider::Provider;
pub use registry::ClientRegistry;
pub use storage::{GrantStore, InMemoryStore};
pub use token::{KeyRing, SigningAlgorithm, SigningError, TokenService};
pub use types::{Client, ClientRegistration, GrantType, ResponseType, Scope};
pub use user::{EndUser, InMemoryUserDirectory, UserAuthenticator, UserSeed};

/// Type alias for authorization server results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use oidc_provider::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{ProviderConfig, SigningConfig};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::http::{OidcState, router};
    pub use crate::oauth::{
        AuthorizationRequest, AuthorizationService, FlowState, FlowStep, TokenRequest,
        TokenResponse,
    };
    pub use crate::provider::Provider;
    pub use crate::registry::ClientRegistry;
    pub use crate::storage::{GrantStore, InMemoryStore};
    pub use crate::token::{KeyRing, SigningAlgorithm, TokenService};
    pub use crate::types::{Client, ClientRegistration, GrantType, ResponseType, Scope};
    pub use crate::user::{EndUser, UserAuthenticator, UserSeed};
}
