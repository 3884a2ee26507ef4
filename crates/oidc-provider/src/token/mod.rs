//! Token signing, issuance and lifecycle.
//!
//! - [`jwt`] - claim sets, signing keys and JWKS documents
//! - [`keyring`] - active and retired signing keys, rotation
//! - [`service`] - minting, refreshing, verifying and revoking tokens
//! - [`introspection`] / [`revocation`] - RFC 7662 and RFC 7009 wire types

pub mod introspection;
pub mod jwt;
pub mod keyring;
pub mod revocation;
pub mod service;

pub use introspection::{IntrospectionRequest, IntrospectionResponse};
pub use jwt::{
    AccessTokenClaims, IdTokenClaims, Jwk, Jwks, SigningAlgorithm, SigningError, SigningKeyPair,
};
pub use keyring::{KeyInfo, KeyRing, KeyStatus};
pub use revocation::{RevocationRequest, TokenTypeHint};
pub use service::{GrantContext, ImplicitTokens, TokenConfig, TokenService, VerifiedAccessToken};
