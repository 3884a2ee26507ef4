//! Authorization endpoint request and response types.
//!
//! [`AuthorizationRequest`] is the raw, untrusted parameter set. Once the
//! client and redirect URI check out it becomes a [`ValidatedAuthorizationRequest`],
//! and from then on every outcome is delivered to the client through
//! [`AuthorizationRedirect`]: in the query for `code`, in the fragment for
//! the implicit response types.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;
use crate::types::{ResponseType, Scope};

// =============================================================================
// Request
// =============================================================================

/// Authorization request parameters as received.
///
/// ```text
/// GET /authorize?response_type=code
///   &client_id=foo
///   &redirect_uri=http://localhost:8080/cb
///   &scope=openid
///   &state=xyz
///   &code_challenge=E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM
///   &code_challenge_method=S256
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Requested response type.
    #[serde(default)]
    pub response_type: Option<String>,

    /// Client identifier.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Redirect URI. May be omitted when the client has exactly one.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Space-delimited scope.
    #[serde(default)]
    pub scope: Option<String>,

    /// Opaque client state, echoed back verbatim.
    #[serde(default)]
    pub state: Option<String>,

    /// OIDC nonce.
    #[serde(default)]
    pub nonce: Option<String>,

    /// PKCE challenge.
    #[serde(default)]
    pub code_challenge: Option<String>,

    /// PKCE method; only `S256` is accepted.
    #[serde(default)]
    pub code_challenge_method: Option<String>,

    /// OIDC `prompt`.
    #[serde(default)]
    pub prompt: Option<String>,
}

/// OIDC `prompt` values that influence the interactive steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    /// No preference.
    #[default]
    Default,
    /// Never show UI; fail with `login_required` / `consent_required`.
    None,
    /// Re-authenticate even with a live login session.
    Login,
    /// Ask for consent even when stored consent covers the request.
    Consent,
}

impl Prompt {
    /// Parses a space-delimited `prompt` value.
    ///
    /// # Errors
    /// `none` cannot be combined with other values; unknown values are
    /// rejected.
    pub fn parse(raw: Option<&str>) -> Result<Self, AuthError> {
        let Some(raw) = raw else {
            return Ok(Self::Default);
        };
        let values: Vec<&str> = raw.split_whitespace().collect();
        if values.contains(&"none") && values.len() > 1 {
            return Err(AuthError::invalid_request(
                "prompt=none cannot be combined with other values",
            ));
        }

        let mut prompt = Self::Default;
        for value in values {
            prompt = match value {
                "none" => Self::None,
                "login" => Self::Login,
                "consent" if prompt == Self::Login => Self::Login,
                "consent" => Self::Consent,
                "select_account" => prompt,
                other => {
                    return Err(AuthError::invalid_request(format!(
                        "unsupported prompt value '{other}'"
                    )));
                }
            };
        }
        Ok(prompt)
    }
}

/// An authorization request whose client, redirect URI, response type and
/// parameters have been validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedAuthorizationRequest {
    /// Client identifier.
    pub client_id: String,
    /// Client display name.
    pub client_name: String,
    /// Registered redirect URI the response goes to.
    pub redirect_uri: String,
    /// Whether the request named the redirect URI explicitly.
    pub redirect_uri_explicit: bool,
    /// Response type.
    pub response_type: ResponseType,
    /// Requested scope.
    pub scope: Scope,
    /// Client state.
    pub state: Option<String>,
    /// OIDC nonce.
    pub nonce: Option<String>,
    /// PKCE S256 challenge.
    pub code_challenge: Option<String>,
    /// Prompt behavior.
    pub prompt: Prompt,
}

impl ValidatedAuthorizationRequest {
    /// Where the response for this request should be placed.
    #[must_use]
    pub fn response_mode(&self) -> ResponseMode {
        ResponseMode::for_response_type(self.response_type)
    }

    /// Builds a redirect carrying `error` back to the client.
    #[must_use]
    pub fn error_redirect(&self, error: &AuthError) -> AuthorizationRedirect {
        AuthorizationRedirect::error(
            &self.redirect_uri,
            self.response_mode(),
            error,
            self.state.as_deref(),
        )
    }
}

// =============================================================================
// Response
// =============================================================================

/// Where authorization response parameters are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// `?code=...&state=...`
    Query,
    /// `#access_token=...&state=...`
    Fragment,
}

impl ResponseMode {
    /// Default mode for a response type.
    #[must_use]
    pub fn for_response_type(response_type: ResponseType) -> Self {
        if response_type.uses_fragment() {
            Self::Fragment
        } else {
            Self::Query
        }
    }
}

/// A redirect back to the client's registered redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRedirect {
    /// Fully built `Location` value.
    pub location: String,
}

impl AuthorizationRedirect {
    /// Builds a redirect with `params` appended in the given mode.
    ///
    /// Existing query parameters of the redirect URI are preserved.
    #[must_use]
    pub fn build(redirect_uri: &str, mode: ResponseMode, params: &[(&str, &str)]) -> Self {
        let Ok(mut url) = Url::parse(redirect_uri) else {
            // Registered redirect URIs are validated on registration.
            return Self {
                location: redirect_uri.to_string(),
            };
        };

        match mode {
            ResponseMode::Query => {
                let mut pairs = url.query_pairs_mut();
                for (name, value) in params {
                    pairs.append_pair(name, value);
                }
            }
            ResponseMode::Fragment => {
                let mut fragment = url::form_urlencoded::Serializer::new(String::new());
                for (name, value) in params {
                    fragment.append_pair(name, value);
                }
                url.set_fragment(Some(&fragment.finish()));
            }
        }

        Self {
            location: url.to_string(),
        }
    }

    /// Successful code response: `code` and `state`.
    #[must_use]
    pub fn code(redirect_uri: &str, code: &str, state: Option<&str>) -> Self {
        let mut params = vec![("code", code)];
        if let Some(state) = state {
            params.push(("state", state));
        }
        Self::build(redirect_uri, ResponseMode::Query, &params)
    }

    /// Error response: `error`, `error_description` and `state`.
    #[must_use]
    pub fn error(
        redirect_uri: &str,
        mode: ResponseMode,
        error: &AuthError,
        state: Option<&str>,
    ) -> Self {
        let description = error.public_description();
        let mut params = vec![
            ("error", error.oauth_error_code()),
            ("error_description", description.as_str()),
        ];
        if let Some(state) = state {
            params.push(("state", state));
        }
        Self::build(redirect_uri, mode, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_redirect() {
        let redirect = AuthorizationRedirect::code("http://localhost:8080/cb", "abc", Some("xyz"));
        assert_eq!(redirect.location, "http://localhost:8080/cb?code=abc&state=xyz");
    }

    #[test]
    fn test_code_redirect_preserves_existing_query() {
        let redirect = AuthorizationRedirect::code("https://app.example/cb?tenant=1", "abc", None);
        assert_eq!(redirect.location, "https://app.example/cb?tenant=1&code=abc");
    }

    #[test]
    fn test_error_redirect_in_query() {
        let redirect = AuthorizationRedirect::error(
            "http://localhost:8080/cb",
            ResponseMode::Query,
            &AuthError::access_denied("user denied"),
            Some("xyz"),
        );
        let url = Url::parse(&redirect.location).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("error".into(), "access_denied".into())));
        assert!(pairs.contains(&("state".into(), "xyz".into())));
        assert!(pairs.iter().any(|(k, _)| k == "error_description"));
    }

    #[test]
    fn test_fragment_mode() {
        let redirect = AuthorizationRedirect::build(
            "https://app.example/cb",
            ResponseMode::Fragment,
            &[("access_token", "t"), ("state", "a b")],
        );
        assert_eq!(
            redirect.location,
            "https://app.example/cb#access_token=t&state=a+b"
        );
    }

    #[test]
    fn test_server_error_description_is_generic() {
        let redirect = AuthorizationRedirect::error(
            "https://app.example/cb",
            ResponseMode::Query,
            &AuthError::storage("table grants locked"),
            None,
        );
        assert!(redirect.location.contains("error=server_error"));
        assert!(!redirect.location.contains("locked"));
    }

    #[test]
    fn test_prompt_parse() {
        assert_eq!(Prompt::parse(None).unwrap(), Prompt::Default);
        assert_eq!(Prompt::parse(Some("none")).unwrap(), Prompt::None);
        assert_eq!(Prompt::parse(Some("consent")).unwrap(), Prompt::Consent);
        assert_eq!(Prompt::parse(Some("login consent")).unwrap(), Prompt::Login);
        assert!(Prompt::parse(Some("none login")).is_err());
        assert!(Prompt::parse(Some("bogus")).is_err());
    }
}
