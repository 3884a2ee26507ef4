//! Domain types shared across the provider.
//!
//! - [`Client`] - registered OAuth 2.0 client
//! - [`Scope`] - normalized scope set
//! - [`AuthorizationCode`] / [`TokenRecord`] - grant store records
//! - [`Consent`] / [`LoginSession`] - remembered end-user decisions

pub mod client;
pub mod consent;
pub mod grant;
pub mod scope;

pub use client::{Client, ClientRegistration, ClientValidationError, GrantType, ResponseType};
pub use consent::{Consent, LoginSession};
pub use grant::{AuthorizationCode, TokenKind, TokenRecord, TokenStatus};
pub use scope::Scope;
