//! Token revocation endpoint (RFC 7009).
//!
//! Requires client authentication, exactly like `/token`. A valid request
//! answers `200 OK` with an empty body whether or not the token existed, so
//! callers learn nothing about other clients' tokens.

use axum::Form;
use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use super::OidcState;
use super::response::oauth_error;
use super::token::authenticate_client;
use crate::error::AuthError;
use crate::token::revocation::{RevocationRequest, TokenTypeHint};

/// `POST /revoke`.
///
/// - 200 OK: revoked, already invalid, or not this client's token
/// - 400 Bad Request: missing `token`
/// - 401 Unauthorized: invalid client credentials
pub async fn revoke_handler(
    State(state): State<OidcState>,
    headers: HeaderMap,
    form: Result<Form<RevocationRequest>, FormRejection>,
) -> Response {
    let Form(request) = match form {
        Ok(form) => form,
        Err(rejection) => {
            return oauth_error(&AuthError::invalid_request(rejection.body_text()), false);
        }
    };

    let client = match authenticate_client(
        &state,
        &headers,
        request.client_id.as_deref(),
        request.client_secret.as_deref(),
    )
    .await
    {
        Ok(client) => client,
        Err(response) => return response,
    };

    let Some(token) = request.token.as_deref().filter(|t| !t.is_empty()) else {
        return oauth_error(&AuthError::invalid_request("missing token parameter"), false);
    };

    // Unknown hints are ignored: every kind is searched.
    let hint = TokenTypeHint::parse(request.token_type_hint.as_deref());
    match state.provider.tokens().revoke(&client, token, hint).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => oauth_error(&e, false),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{StatusCode, header};

    use super::super::test_support::{form, grant_tokens, send, state};

    #[tokio::test]
    async fn test_revoking_refresh_token_revokes_access_token() {
        let state = state().await;
        let issued = grant_tokens(&state, "openid profile").await;

        let response = send(
            &state,
            form(
                "/revoke",
                format!(
                    "token={}&token_type_hint=refresh_token&client_id=foo&client_secret=bar",
                    issued.refresh_token.clone().unwrap()
                ),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let result = state.provider.tokens().verify_access_token(&issued.access_token).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unknown_token_is_ok() {
        let state = state().await;
        let response = send(
            &state,
            form("/revoke", "token=garbage&client_id=foo&client_secret=bar".to_string()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_requires_client_authentication() {
        let state = state().await;
        let response = send(
            &state,
            form("/revoke", "token=garbage&client_id=foo&client_secret=wrong".to_string()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn test_missing_token_is_invalid_request() {
        let state = state().await;
        let response = send(&state, form("/revoke", "client_id=foo&client_secret=bar".to_string())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
