//! Client authentication for the token, revocation and introspection
//! endpoints.
//!
//! # Authentication Methods
//!
//! - `client_secret_basic` - HTTP Basic Auth with `client_id:client_secret`
//! - `client_secret_post` - `client_id` and `client_secret` in the form body
//! - `none` - public clients, `client_id` only
//!
//! A request may use only one method. Basic credentials combined with a
//! `client_secret` in the body are rejected.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::registry::ClientRegistry;
use crate::types::Client;

/// Token endpoint authentication methods (OpenID Connect Core Section 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// Public client, no secret.
    None,
    /// Secret via HTTP Basic Auth.
    ClientSecretBasic,
    /// Secret in the request body.
    ClientSecretPost,
}

impl TokenEndpointAuthMethod {
    /// Methods advertised in discovery.
    pub const SUPPORTED: [Self; 3] = [Self::ClientSecretBasic, Self::ClientSecretPost, Self::None];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }
}

impl fmt::Display for TokenEndpointAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Credentials a client presented, before they are checked.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    /// Claimed client ID.
    pub client_id: String,
    /// Presented secret.
    pub client_secret: Option<String>,
    /// How the credentials were sent.
    pub method: TokenEndpointAuthMethod,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("method", &self.method)
            .finish()
    }
}

impl ClientCredentials {
    /// Extracts credentials from the `Authorization` header and form body.
    ///
    /// # Errors
    /// - `InvalidRequest` when more than one method is used, or the body
    ///   `client_id` disagrees with the Basic credentials
    /// - `InvalidClientCredentials` when no credentials are present or the
    ///   Basic header is malformed
    pub fn extract(
        authorization: Option<&str>,
        body_client_id: Option<&str>,
        body_client_secret: Option<&str>,
    ) -> AuthResult<Self> {
        let basic = authorization.filter(|h| has_basic_scheme(h));

        if let Some(header) = basic {
            if body_client_secret.is_some() {
                return Err(AuthError::invalid_request(
                    "multiple client authentication methods used",
                ));
            }
            let (client_id, client_secret) =
                parse_basic_auth(header).ok_or(AuthError::InvalidClientCredentials)?;
            if body_client_id.is_some_and(|id| id != client_id) {
                return Err(AuthError::invalid_request(
                    "client_id does not match the Authorization header",
                ));
            }
            return Ok(Self {
                client_id,
                client_secret: Some(client_secret),
                method: TokenEndpointAuthMethod::ClientSecretBasic,
            });
        }

        match (body_client_id, body_client_secret) {
            (Some(id), Some(secret)) => Ok(Self {
                client_id: id.to_string(),
                client_secret: Some(secret.to_string()),
                method: TokenEndpointAuthMethod::ClientSecretPost,
            }),
            (Some(id), None) => Ok(Self {
                client_id: id.to_string(),
                client_secret: None,
                method: TokenEndpointAuthMethod::None,
            }),
            (None, _) => Err(AuthError::InvalidClientCredentials),
        }
    }

    /// Checks the credentials against the registry.
    ///
    /// # Errors
    /// `InvalidClientCredentials` on any mismatch.
    pub async fn authenticate(&self, registry: &ClientRegistry) -> AuthResult<Client> {
        let client = registry
            .authenticate(&self.client_id, self.client_secret.as_deref())
            .await?;
        tracing::debug!(client_id = %client.client_id, method = %self.method, "Client authenticated");
        Ok(client)
    }
}

fn has_basic_scheme(header: &str) -> bool {
    header
        .trim_start()
        .get(..6)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("basic "))
}

/// Parses an HTTP Basic `Authorization` header into `(client_id, secret)`.
///
/// The scheme is case-insensitive. Both parts are percent-decoded
/// (RFC 6749 Section 2.3.1).
#[must_use]
pub fn parse_basic_auth(header_value: &str) -> Option<(String, String)> {
    let header_value = header_value.trim();
    if !has_basic_scheme(header_value) {
        return None;
    }

    let decoded = STANDARD.decode(header_value[6..].trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    // The secret may contain colons.
    let (client_id, client_secret) = credentials.split_once(':')?;
    if client_id.is_empty() {
        return None;
    }

    let client_id = urlencoding::decode(client_id).ok()?.into_owned();
    let client_secret = urlencoding::decode(client_secret).ok()?.into_owned();
    Some((client_id, client_secret))
}
