//! OAuth 2.0 / OpenID Connect protocol logic.
//!
//! # Authorization Code Flow
//!
//! - [`authorize`] - request/response types for the authorization endpoint
//! - [`flow`] - the authorization state machine
//! - [`service`] - validation, login, consent and code issuance
//! - [`pkce`] - PKCE S256 challenge/verifier
//! - [`client_auth`] - client authentication at the token endpoint
//! - [`token`] - token endpoint request/response types
//!
//! # Example
//!
//! ```ignore
//! use oidc_provider::oauth::{AuthorizationRequest, FlowStep};
//!
//! let step = provider.authorization().begin(&request, None).await?;
//! if let FlowStep::Login { flow, .. } = step {
//!     let outcome = provider.authorization().login(&flow.id, "alice", "secret").await?;
//! }
//! ```

pub mod authorize;
pub mod client_auth;
pub mod flow;
pub mod pkce;
pub mod service;
pub mod token;

pub use authorize::{
    AuthorizationRedirect, AuthorizationRequest, Prompt, ResponseMode,
    ValidatedAuthorizationRequest,
};
pub use client_auth::{ClientCredentials, TokenEndpointAuthMethod, parse_basic_auth};
pub use flow::{AuthorizationFlow, FlowState};
pub use pkce::{CodeChallenge, CodeVerifier, PkceError, verify_code_verifier};
pub use service::{
    AuthorizationConfig, AuthorizationService, AuthorizeFailure, FlowStep, LoginOutcome,
};
pub use token::{ErrorResponse, TokenRequest, TokenResponse};
