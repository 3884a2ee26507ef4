//! OAuth 2.0 client domain types.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::scope::Scope;
use crate::error::AuthError;
use crate::secret::hash_client_secret;

// =============================================================================
// Grant Type
// =============================================================================

/// OAuth 2.0 grant types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code flow.
    AuthorizationCode,
    /// Implicit flow (tokens returned from the authorization endpoint).
    Implicit,
    /// Refresh token flow.
    RefreshToken,
    /// Client credentials flow (confidential clients only).
    ClientCredentials,
}

impl GrantType {
    /// Returns the OAuth 2.0 `grant_type` parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::Implicit => "implicit",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
        }
    }

    /// Parses a `grant_type` parameter value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "implicit" => Some(Self::Implicit),
            "refresh_token" => Some(Self::RefreshToken),
            "client_credentials" => Some(Self::ClientCredentials),
            _ => None,
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Response Type
// =============================================================================

/// Supported `response_type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResponseType {
    /// `code`
    Code,
    /// `token`
    Token,
    /// `id_token`
    IdToken,
    /// `id_token token`
    IdTokenToken,
}

impl ResponseType {
    /// Every supported response type, in discovery order.
    pub const ALL: [ResponseType; 4] = [Self::Code, Self::IdToken, Self::Token, Self::IdTokenToken];

    /// Parses a space-delimited `response_type`; token order is not significant.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts: Vec<&str> = value.split_whitespace().collect();
        parts.sort_unstable();
        parts.dedup();
        match parts.as_slice() {
            ["code"] => Some(Self::Code),
            ["token"] => Some(Self::Token),
            ["id_token"] => Some(Self::IdToken),
            ["id_token", "token"] => Some(Self::IdTokenToken),
            _ => None,
        }
    }

    /// Canonical wire form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Token => "token",
            Self::IdToken => "id_token",
            Self::IdTokenToken => "id_token token",
        }
    }

    /// Grant type a client must hold to use this response type.
    #[must_use]
    pub fn required_grant(&self) -> GrantType {
        match self {
            Self::Code => GrantType::AuthorizationCode,
            Self::Token | Self::IdToken | Self::IdTokenToken => GrantType::Implicit,
        }
    }

    /// Returns `true` for response types answered in the URL fragment.
    #[must_use]
    pub fn uses_fragment(&self) -> bool {
        !matches!(self, Self::Code)
    }

    /// Returns `true` if the authorization endpoint returns an access token.
    #[must_use]
    pub fn includes_access_token(&self) -> bool {
        matches!(self, Self::Token | Self::IdTokenToken)
    }

    /// Returns `true` if the authorization endpoint returns an ID token.
    #[must_use]
    pub fn includes_id_token(&self) -> bool {
        matches!(self, Self::IdToken | Self::IdTokenToken)
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ResponseType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unsupported response type '{value}'"))
    }
}

impl From<ResponseType> for String {
    fn from(value: ResponseType) -> Self {
        value.as_str().to_string()
    }
}

// =============================================================================
// Registration
// =============================================================================

fn default_grant_types() -> Vec<GrantType> {
    vec![GrantType::AuthorizationCode, GrantType::RefreshToken]
}

fn default_response_types() -> Vec<ResponseType> {
    vec![ResponseType::Code]
}

/// Client registration input, as written in configuration.
///
/// The plaintext secret only lives here; [`ClientRegistration::into_client`]
/// hashes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistration {
    /// Unique client identifier.
    pub client_id: String,

    /// Plaintext client secret; absent for public clients.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Display name shown on login and consent pages.
    #[serde(default)]
    pub name: Option<String>,

    /// Exact-match redirect URIs.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Allowed grant types.
    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<GrantType>,

    /// Allowed response types.
    #[serde(default = "default_response_types")]
    pub response_types: Vec<ResponseType>,

    /// Scopes the client may request. Empty means every supported scope.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Forces PKCE for a confidential client. Public clients always need it.
    #[serde(default)]
    pub pkce_required: bool,
}

impl ClientRegistration {
    /// Creates a confidential authorization-code client.
    #[must_use]
    pub fn confidential(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uris: Vec<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Some(client_secret.into()),
            name: None,
            redirect_uris,
            grant_types: default_grant_types(),
            response_types: default_response_types(),
            scopes: Vec::new(),
            pkce_required: false,
        }
    }

    /// Creates a public (secretless) authorization-code client.
    #[must_use]
    pub fn public(client_id: impl Into<String>, redirect_uris: Vec<String>) -> Self {
        Self {
            client_secret: None,
            ..Self::confidential(client_id, String::new(), redirect_uris)
        }
    }

    /// Sets the grant types.
    #[must_use]
    pub fn with_grant_types(mut self, grant_types: Vec<GrantType>) -> Self {
        self.grant_types = grant_types;
        self
    }

    /// Sets the response types.
    #[must_use]
    pub fn with_response_types(mut self, response_types: Vec<ResponseType>) -> Self {
        self.response_types = response_types;
        self
    }

    /// Restricts the scopes the client may request.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Validates the registration and produces the stored client record.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration is inconsistent.
    pub fn into_client(self) -> Result<Client, ClientValidationError> {
        let client = Client {
            name: self.name.unwrap_or_else(|| self.client_id.clone()),
            client_id: self.client_id,
            secret_hash: self
                .client_secret
                .filter(|s| !s.is_empty())
                .map(|s| hash_client_secret(&s)),
            redirect_uris: self.redirect_uris,
            grant_types: self.grant_types,
            response_types: self.response_types,
            scopes: self.scopes,
            pkce_required: self.pkce_required,
            created_at: OffsetDateTime::now_utc(),
        };
        client.validate()?;
        Ok(client)
    }
}

// =============================================================================
// Client
// =============================================================================

/// A registered OAuth 2.0 client.
///
/// Immutable once registered except through an explicit registry update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier.
    pub client_id: String,

    /// SHA-256 hex of the client secret (confidential clients).
    #[serde(skip_serializing)]
    pub secret_hash: Option<String>,

    /// Display name.
    pub name: String,

    /// Exact-match redirect URIs.
    pub redirect_uris: Vec<String>,

    /// Allowed grant types.
    pub grant_types: Vec<GrantType>,

    /// Allowed response types.
    pub response_types: Vec<ResponseType>,

    /// Scopes the client may request. Empty means every supported scope.
    pub scopes: Vec<String>,

    /// Whether a confidential client must use PKCE.
    pub pkce_required: bool,

    /// Registration time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Client {
    /// Validates the client configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the client configuration is invalid.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.client_id.trim().is_empty() {
            return Err(ClientValidationError::EmptyClientId);
        }

        if self.grant_types.is_empty() {
            return Err(ClientValidationError::NoGrantTypes);
        }

        if !self.is_confidential() && self.grant_types.contains(&GrantType::ClientCredentials) {
            return Err(ClientValidationError::PublicClientCredentials);
        }

        for response_type in &self.response_types {
            if !self.grant_types.contains(&response_type.required_grant()) {
                return Err(ClientValidationError::ResponseTypeWithoutGrant {
                    response_type: *response_type,
                });
            }
        }

        let redirecting = self.grant_types.contains(&GrantType::AuthorizationCode)
            || self.grant_types.contains(&GrantType::Implicit);
        if redirecting && self.redirect_uris.is_empty() {
            return Err(ClientValidationError::NoRedirectUris);
        }

        for uri in &self.redirect_uris {
            let parsed = url::Url::parse(uri).map_err(|e| ClientValidationError::InvalidRedirectUri {
                uri: uri.clone(),
                reason: e.to_string(),
            })?;
            if parsed.fragment().is_some() {
                return Err(ClientValidationError::InvalidRedirectUri {
                    uri: uri.clone(),
                    reason: "fragment is not allowed".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Returns `true` if the client holds a secret.
    #[must_use]
    pub fn is_confidential(&self) -> bool {
        self.secret_hash.is_some()
    }

    /// Exact string comparison against registered redirect URIs.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// Checks if the given grant type is allowed for this client.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Checks if the given response type is allowed for this client.
    #[must_use]
    pub fn is_response_type_allowed(&self, response_type: ResponseType) -> bool {
        self.response_types.contains(&response_type)
    }

    /// Checks if the given scope token may be requested by this client.
    #[must_use]
    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        self.scopes.is_empty() || self.scopes.iter().any(|allowed| allowed == scope)
    }

    /// Checks every token of `requested` against the provider's supported
    /// scopes and this client's allowed scopes.
    ///
    /// # Errors
    /// `InvalidScope` naming the first rejected token.
    pub fn ensure_scope(&self, requested: &Scope, supported: &Scope) -> Result<(), AuthError> {
        for token in requested.iter() {
            if !supported.contains(token) {
                return Err(AuthError::invalid_scope(format!("unsupported scope '{token}'")));
            }
            if !self.is_scope_allowed(token) {
                return Err(AuthError::invalid_scope(format!(
                    "scope '{token}' is not allowed for this client"
                )));
            }
        }
        Ok(())
    }

    /// PKCE is always required for public clients.
    #[must_use]
    pub fn requires_pkce(&self) -> bool {
        !self.is_confidential() || self.pkce_required
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Errors that can occur during client validation.
#[derive(Debug, thiserror::Error)]
pub enum ClientValidationError {
    /// Client ID cannot be empty.
    #[error("Client ID cannot be empty")]
    EmptyClientId,

    /// At least one grant type is required.
    #[error("At least one grant type is required")]
    NoGrantTypes,

    /// Public clients cannot use client_credentials grant.
    #[error("Public clients cannot use client_credentials grant")]
    PublicClientCredentials,

    /// Redirect-based flows require redirect URIs.
    #[error("Authorization code and implicit flows require redirect URIs")]
    NoRedirectUris,

    /// A redirect URI is not an absolute URI without fragment.
    #[error("Invalid redirect URI '{uri}': {reason}")]
    InvalidRedirectUri {
        /// The rejected URI.
        uri: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A response type is registered without the grant type it needs.
    #[error("Response type '{response_type}' requires grant type '{}'", response_type.required_grant())]
    ResponseTypeWithoutGrant {
        /// The offending response type.
        response_type: ResponseType,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foo() -> ClientRegistration {
        ClientRegistration::confidential("foo", "bar", vec!["http://localhost:8080/cb".to_string()])
    }

    #[test]
    fn test_registration_hashes_secret() {
        let client = foo().into_client().unwrap();
        assert!(client.is_confidential());
        let hash = client.secret_hash.as_deref().unwrap();
        assert_ne!(hash, "bar");
        assert!(crate::secret::verify_client_secret("bar", hash));
        assert_eq!(client.name, "foo");
    }

    #[test]
    fn test_secret_never_serialized() {
        let client = foo().into_client().unwrap();
        let json = serde_json::to_value(&client).unwrap();
        assert!(json.get("secret_hash").is_none());
    }

    #[test]
    fn test_redirect_match_is_exact() {
        let client = foo().into_client().unwrap();
        assert!(client.is_redirect_uri_allowed("http://localhost:8080/cb"));
        assert!(!client.is_redirect_uri_allowed("http://localhost:8080/cb/"));
        assert!(!client.is_redirect_uri_allowed("http://localhost:8080/cb?x=1"));
        assert!(!client.is_redirect_uri_allowed("http://localhost:8080/cb2"));
        assert!(!client.is_redirect_uri_allowed("http://localhost:8080"));
    }

    #[test]
    fn test_public_client_requires_pkce() {
        let client = ClientRegistration::public("spa", vec!["https://app.example/cb".to_string()])
            .into_client()
            .unwrap();
        assert!(!client.is_confidential());
        assert!(client.requires_pkce());
        assert!(!foo().into_client().unwrap().requires_pkce());
    }

    #[test]
    fn test_public_client_cannot_use_client_credentials() {
        let err = ClientRegistration::public("svc", vec![])
            .with_grant_types(vec![GrantType::ClientCredentials])
            .with_response_types(vec![])
            .into_client()
            .unwrap_err();
        assert!(matches!(err, ClientValidationError::PublicClientCredentials));
    }

    #[test]
    fn test_code_flow_requires_redirect_uris() {
        let err = ClientRegistration::confidential("foo", "bar", vec![])
            .into_client()
            .unwrap_err();
        assert!(matches!(err, ClientValidationError::NoRedirectUris));
    }

    #[test]
    fn test_redirect_uri_must_be_absolute_without_fragment() {
        let err = ClientRegistration::confidential("foo", "bar", vec!["/relative".to_string()])
            .into_client()
            .unwrap_err();
        assert!(matches!(err, ClientValidationError::InvalidRedirectUri { .. }));

        let err = ClientRegistration::confidential(
            "foo",
            "bar",
            vec!["https://app.example/cb#frag".to_string()],
        )
        .into_client()
        .unwrap_err();
        assert!(matches!(err, ClientValidationError::InvalidRedirectUri { .. }));
    }

    #[test]
    fn test_implicit_response_type_needs_implicit_grant() {
        let err = foo()
            .with_response_types(vec![ResponseType::Code, ResponseType::Token])
            .into_client()
            .unwrap_err();
        assert!(matches!(
            err,
            ClientValidationError::ResponseTypeWithoutGrant {
                response_type: ResponseType::Token
            }
        ));
    }

    #[test]
    fn test_response_type_parse_ignores_order() {
        assert_eq!(ResponseType::parse("code"), Some(ResponseType::Code));
        assert_eq!(ResponseType::parse("token id_token"), Some(ResponseType::IdTokenToken));
        assert_eq!(ResponseType::parse("id_token token"), Some(ResponseType::IdTokenToken));
        assert_eq!(ResponseType::parse("code id_token"), None);
        assert_eq!(ResponseType::parse(""), None);
        assert!(ResponseType::Token.uses_fragment());
        assert!(!ResponseType::Code.uses_fragment());
    }

    #[test]
    fn test_scope_restrictions() {
        let open = foo().into_client().unwrap();
        assert!(open.is_scope_allowed("anything"));

        let restricted = foo()
            .with_scopes(vec!["openid".to_string()])
            .into_client()
            .unwrap();
        assert!(restricted.is_scope_allowed("openid"));
        assert!(!restricted.is_scope_allowed("email"));
    }

    #[test]
    fn test_registration_from_toml() {
        let registration: ClientRegistration = toml_like(
            r#"{"client_id":"foo","client_secret":"bar","redirect_uris":["http://localhost:8080/cb"]}"#,
        );
        assert_eq!(
            registration.grant_types,
            vec![GrantType::AuthorizationCode, GrantType::RefreshToken]
        );
        assert_eq!(registration.response_types, vec![ResponseType::Code]);
    }

    fn toml_like(json: &str) -> ClientRegistration {
        serde_json::from_str(json).unwrap()
    }
}
