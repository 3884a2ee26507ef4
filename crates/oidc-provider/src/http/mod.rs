//! HTTP surface of the provider.
//!
//! [`router`] returns an Axum router with every endpoint mounted relative to
//! its root; the server nests it under the issuer's path.
//!
//! # Endpoints
//!
//! - [`discovery`] - `GET /.well-known/openid-configuration`
//! - [`jwks`] - `GET /jwks`
//! - [`authorize`] - `GET|POST /authorize` (login and consent pages)
//! - [`token`] - `POST /token`
//! - [`userinfo`] - `GET|POST /userinfo`
//! - [`revoke`] - `POST /revoke` (RFC 7009)
//! - [`introspect`] - `POST /introspect` (RFC 7662)
//! - [`logout`] - `GET|POST /logout`

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::provider::Provider;

pub mod authorize;
pub mod discovery;
pub mod introspect;
pub mod jwks;
pub mod logout;
pub mod response;
pub mod revoke;
pub mod templates;
pub mod token;
pub mod userinfo;

pub use authorize::{authorize_get, authorize_post};
pub use discovery::{DiscoveryDocument, openid_configuration_handler};
pub use introspect::introspect_handler;
pub use jwks::jwks_handler;
pub use logout::logout_handler;
pub use revoke::revoke_handler;
pub use token::token_handler;
pub use userinfo::userinfo_handler;

/// Endpoint paths relative to the issuer.
pub mod paths {
    /// OpenID Provider metadata.
    pub const DISCOVERY: &str = "/.well-known/openid-configuration";
    /// Public signing keys.
    pub const JWKS: &str = "/jwks";
    /// Authorization endpoint.
    pub const AUTHORIZE: &str = "/authorize";
    /// Token endpoint.
    pub const TOKEN: &str = "/token";
    /// UserInfo endpoint.
    pub const USERINFO: &str = "/userinfo";
    /// Token revocation.
    pub const REVOKE: &str = "/revoke";
    /// Token introspection.
    pub const INTROSPECT: &str = "/introspect";
    /// End of the browser login session.
    pub const LOGOUT: &str = "/logout";
}

/// Name of the browser login session cookie.
pub const SESSION_COOKIE: &str = "oidc_session";

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct OidcState {
    /// The provider behind every endpoint.
    pub provider: Arc<Provider>,
    /// Whether cookies carry the `Secure` attribute.
    pub secure_cookies: bool,
}

impl OidcState {
    /// Creates handler state. Cookies are `Secure` when the issuer is served
    /// over https.
    #[must_use]
    pub fn new(provider: Arc<Provider>) -> Self {
        let secure_cookies = provider.issuer().starts_with("https://");
        Self {
            provider,
            secure_cookies,
        }
    }
}

/// Builds the router for all provider endpoints.
pub fn router(state: OidcState) -> Router {
    Router::new()
        .route(paths::DISCOVERY, get(openid_configuration_handler))
        .route(paths::JWKS, get(jwks_handler))
        .route(paths::AUTHORIZE, get(authorize_get).post(authorize_post))
        .route(paths::TOKEN, post(token_handler))
        .route(paths::USERINFO, get(userinfo_handler).post(userinfo_handler))
        .route(paths::REVOKE, post(revoke_handler))
        .route(paths::INTROSPECT, post(introspect_handler))
        .route(paths::LOGOUT, get(logout_handler).post(logout_handler))
        .with_state(state)
}
