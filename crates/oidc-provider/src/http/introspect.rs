//! Token introspection endpoint (RFC 7662).

use axum::Form;
use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;

use super::OidcState;
use super::response::{json_no_store, oauth_error};
use super::token::authenticate_client;
use crate::error::AuthError;
use crate::token::introspection::IntrospectionRequest;
use crate::token::revocation::TokenTypeHint;

/// `POST /introspect`.
///
/// Any authenticated client may introspect. Unknown, expired and revoked
/// tokens all yield `{"active": false}` with `200 OK`.
pub async fn introspect_handler(
    State(state): State<OidcState>,
    headers: HeaderMap,
    form: Result<Form<IntrospectionRequest>, FormRejection>,
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

    let hint = TokenTypeHint::parse(request.token_type_hint.as_deref());
    match state.provider.tokens().introspect(token, hint).await {
        Ok(response) => {
            tracing::debug!(client_id = %client.client_id, active = response.active, "Token introspected");
            json_no_store(StatusCode::OK, &response)
        }
        Err(e) => oauth_error(&e, false),
    }
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_include;
    use axum::http::StatusCode;

    use super::super::test_support::{body_json, form, grant_tokens, send, state};

    #[tokio::test]
    async fn test_active_access_token() {
        let state = state().await;
        let issued = grant_tokens(&state, "openid email").await;

        let response = send(
            &state,
            form(
                "/introspect",
                format!("token={}&client_id=foo&client_secret=bar", issued.access_token),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_json_include!(
            actual: body,
            expected: serde_json::json!({
                "active": true,
                "client_id": "foo",
                "sub": "alice",
                "scope": "email openid",
                "token_type": "access_token",
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_token_is_inactive() {
        let state = state().await;
        let response = send(
            &state,
            form("/introspect", "token=nope&client_id=foo&client_secret=bar".to_string()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!({ "active": false }));
    }
}
