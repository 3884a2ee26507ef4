//! Token endpoint (`POST /token`).
//!
//! ```text
//! POST /token
//! Authorization: Basic Zm9vOmJhcg==
//! Content-Type: application/x-www-form-urlencoded
//!
//! grant_type=authorization_code&code=...&redirect_uri=http://localhost:8080/cb
//! ```

use axum::Form;
use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use tracing::{debug, info, warn};

use super::OidcState;
use super::response::{json_no_store, oauth_error};
use crate::error::AuthError;
use crate::oauth::client_auth::{ClientCredentials, TokenEndpointAuthMethod};
use crate::oauth::token::TokenRequest;
use crate::types::{Client, GrantType};

/// Handler for `POST /token`.
///
/// Success is `200` with a `no-store` JSON token response. Failures are
/// `{error, error_description}`: `401` for client authentication, `400`
/// for everything the client got wrong, `500` for server faults.
pub async fn token_handler(
    State(state): State<OidcState>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
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
    let basic = uses_basic_auth(&headers);

    let grant_type = request.grant_type.as_deref().unwrap_or_default();
    debug!(client_id = %client.client_id, grant_type = %grant_type, "Processing token request");

    let tokens = state.provider.tokens();
    let result = if grant_type.is_empty() {
        Err(AuthError::invalid_request("missing grant_type parameter"))
    } else {
        match GrantType::parse(grant_type) {
            Some(GrantType::AuthorizationCode) => tokens.exchange_code(&client, &request).await,
            Some(GrantType::RefreshToken) => tokens.refresh(&client, &request).await,
            Some(GrantType::ClientCredentials) => tokens.client_credentials(&client, &request).await,
            // Implicit tokens are only issued from /authorize.
            Some(GrantType::Implicit) | None => Err(AuthError::unsupported_grant_type(grant_type)),
        }
    };

    match result {
        Ok(response) => {
            info!(client_id = %client.client_id, grant_type = %grant_type, "Token issued");
            json_no_store(StatusCode::OK, &response)
        }
        Err(e) => {
            warn!(
                client_id = %client.client_id,
                grant_type = %grant_type,
                error = %e,
                "Token request failed"
            );
            oauth_error(&e, basic)
        }
    }
}

/// Authenticates the calling client from the `Authorization` header or the
/// form body. On failure returns the finished `401`/`400` response.
pub(super) async fn authenticate_client(
    state: &OidcState,
    headers: &HeaderMap,
    body_client_id: Option<&str>,
    body_client_secret: Option<&str>,
) -> Result<Client, Response> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let credentials = ClientCredentials::extract(authorization, body_client_id, body_client_secret)
        .map_err(|e| oauth_error(&e, authorization.is_some()))?;

    credentials
        .authenticate(state.provider.registry())
        .await
        .map_err(|e| {
            warn!(client_id = %credentials.client_id, method = %credentials.method, "Client authentication failed");
            oauth_error(&e, credentials.method == TokenEndpointAuthMethod::ClientSecretBasic)
        })
}

fn uses_basic_auth(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.get(..6))
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("basic "))
}
