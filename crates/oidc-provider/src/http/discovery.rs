//! OpenID Connect Discovery (`/.well-known/openid-configuration`).

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use super::{OidcState, paths};
use crate::oauth::client_auth::TokenEndpointAuthMethod;
use crate::provider::Provider;
use crate::types::{GrantType, ResponseType};

/// OpenID Provider Metadata (OpenID Connect Discovery 1.0 Section 3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub revocation_endpoint: String,
    pub introspection_endpoint: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub response_modes_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

impl DiscoveryDocument {
    /// Builds the document for `provider`. Endpoint URLs are relative to the
    /// issuer.
    #[must_use]
    pub fn build(provider: &Provider) -> Self {
        let issuer = provider.issuer();
        let endpoint = |path: &str| format!("{issuer}{path}");
        let strings = |values: &[&str]| values.iter().map(|v| (*v).to_string()).collect();

        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: endpoint(paths::AUTHORIZE),
            token_endpoint: endpoint(paths::TOKEN),
            userinfo_endpoint: endpoint(paths::USERINFO),
            jwks_uri: endpoint(paths::JWKS),
            revocation_endpoint: endpoint(paths::REVOKE),
            introspection_endpoint: endpoint(paths::INTROSPECT),
            scopes_supported: provider.config().scopes_supported.clone(),
            response_types_supported: ResponseType::ALL.iter().map(|t| t.as_str().to_string()).collect(),
            response_modes_supported: strings(&["query", "fragment"]),
            grant_types_supported: [
                GrantType::AuthorizationCode,
                GrantType::Implicit,
                GrantType::RefreshToken,
                GrantType::ClientCredentials,
            ]
            .iter()
            .map(|g| g.as_str().to_string())
            .collect(),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: vec![provider.keys().algorithm().to_string()],
            token_endpoint_auth_methods_supported: TokenEndpointAuthMethod::SUPPORTED
                .iter()
                .map(|m| m.as_str().to_string())
                .collect(),
            code_challenge_methods_supported: strings(&["S256"]),
            claims_supported: strings(&[
                "sub",
                "iss",
                "aud",
                "exp",
                "iat",
                "auth_time",
                "nonce",
                "at_hash",
                "name",
                "preferred_username",
                "email",
                "email_verified",
            ]),
        }
    }
}

/// Handler for `GET /.well-known/openid-configuration`.
pub async fn openid_configuration_handler(State(state): State<OidcState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(DiscoveryDocument::build(&state.provider)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    #[tokio::test]
    async fn test_document_endpoints_follow_issuer() {
        let config = ProviderConfig {
            issuer: "https://id.example.com/oauth/oidc/".into(),
            ..ProviderConfig::default()
        };
        let provider = Provider::init(config).await.unwrap();
        let doc = DiscoveryDocument::build(&provider);

        assert_eq!(doc.issuer, "https://id.example.com/oauth/oidc");
        assert_eq!(doc.token_endpoint, "https://id.example.com/oauth/oidc/token");
        assert_eq!(doc.jwks_uri, "https://id.example.com/oauth/oidc/jwks");
        assert_eq!(doc.id_token_signing_alg_values_supported, vec!["RS256"]);
        assert_eq!(doc.code_challenge_methods_supported, vec!["S256"]);
        assert!(doc.response_types_supported.contains(&"code".to_string()));
        assert!(doc.token_endpoint_auth_methods_supported.contains(&"client_secret_basic".to_string()));
    }
}
