//! Token endpoint request and response types.
//!
//! Supported grant types:
//!
//! - `authorization_code` - exchange a code for tokens
//! - `refresh_token` - rotate a refresh token
//! - `client_credentials` - machine-to-machine tokens

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Token request parameters (form-encoded).
///
/// Every field is optional at the parsing stage so that a missing parameter
/// is reported as `invalid_request` rather than as a form rejection.
///
/// | grant type           | parameters                                      |
/// |----------------------|-------------------------------------------------|
/// | `authorization_code` | `code`, `redirect_uri`, `code_verifier`          |
/// | `refresh_token`      | `refresh_token`, optional narrower `scope`       |
/// | `client_credentials` | optional `scope`                                 |
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// Grant type.
    #[serde(default)]
    pub grant_type: Option<String>,

    /// Authorization code.
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI from the authorization request.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// PKCE verifier.
    #[serde(default)]
    pub code_verifier: Option<String>,

    /// Refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Requested scope.
    #[serde(default)]
    pub scope: Option<String>,

    /// Client ID (`client_secret_post` or public clients).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (`client_secret_post`).
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Successful token response.
///
/// ```json
/// {
///   "access_token": "eyJ...",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "refresh_token": "q0X...",
///   "scope": "openid profile"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Signed access token.
    pub access_token: String,

    /// Always `Bearer`.
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Refresh token, when the grant allows refreshing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// ID token, when `openid` was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Granted scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Creates a bearer token response.
    #[must_use]
    pub fn bearer(access_token: String, expires_in: u64) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            refresh_token: None,
            id_token: None,
            scope: None,
        }
    }
}

/// OAuth 2.0 error response body (RFC 6749 Section 5.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ErrorResponse {
    /// Builds the wire form of `error`. Server faults carry a generic
    /// description.
    #[must_use]
    pub fn from_error(error: &AuthError) -> Self {
        Self {
            error: error.oauth_error_code().to_string(),
            error_description: Some(error.public_description()),
        }
    }

    /// HTTP status for this error: 401 for `invalid_client` and
    /// `invalid_token`, 500 for `server_error`, 400 otherwise.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self.error.as_str() {
            "invalid_client" | "invalid_token" => 401,
            "server_error" => 500,
            _ => 400,
        }
    }
}

impl From<&AuthError> for ErrorResponse {
    fn from(error: &AuthError) -> Self {
        Self::from_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GENERIC_SERVER_ERROR;

    #[test]
    fn test_token_response_shape() {
        let mut response = TokenResponse::bearer("at".into(), 3600);
        response.refresh_token = Some("rt".into());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 3600);
        assert_eq!(json["refresh_token"], "rt");
        assert!(json.get("id_token").is_none());
        assert!(json.get("scope").is_none());
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (AuthError::InvalidClientCredentials, "invalid_client", 401),
            (AuthError::CodeAlreadyUsed, "invalid_grant", 400),
            (AuthError::PkceVerificationFailed, "invalid_grant", 400),
            (AuthError::invalid_request("x"), "invalid_request", 400),
            (AuthError::unsupported_grant_type("password"), "unsupported_grant_type", 400),
            (AuthError::storage("down"), "server_error", 500),
        ];
        for (error, code, status) in cases {
            let body = ErrorResponse::from_error(&error);
            assert_eq!(body.error, code);
            assert_eq!(body.http_status(), status, "{code}");
        }
    }

    #[test]
    fn test_server_error_is_generic() {
        let body = ErrorResponse::from_error(&AuthError::storage("connection reset"));
        assert_eq!(body.error_description.as_deref(), Some(GENERIC_SERVER_ERROR));
    }

    #[test]
    fn test_request_parses_partial_form() {
        let request: TokenRequest =
            serde_json::from_str(r#"{"grant_type":"authorization_code","code":"c"}"#).unwrap();
        assert_eq!(request.grant_type.as_deref(), Some("authorization_code"));
        assert!(request.redirect_uri.is_none());
    }
}
