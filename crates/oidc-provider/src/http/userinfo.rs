//! OpenID Connect UserInfo endpoint.
//!
//! Returns claims about the end-user bound to a bearer access token. The
//! claims depend on the token's scope:
//!
//! - `openid` (required): `sub`
//! - `profile`: `preferred_username`, `name`
//! - `email`: `email`, `email_verified`
//!
//! Errors follow RFC 6750: `401` with `WWW-Authenticate: Bearer
//! error="invalid_token"` for missing or bad tokens, `403` with
//! `error="insufficient_scope"` when `openid` was not granted.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::OidcState;
use super::response::oauth_error;
use crate::error::AuthError;
use crate::types::scope;

/// `GET|POST /userinfo`.
pub async fn userinfo_handler(State(state): State<OidcState>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return bearer_error(StatusCode::UNAUTHORIZED, None, "");
    };

    let verified = match state.provider.tokens().verify_access_token(token).await {
        Ok(verified) => verified,
        Err(e) if e.is_server_error() => return oauth_error(&e, false),
        Err(e) => {
            tracing::debug!(error = %e, "UserInfo request with an unusable token");
            return bearer_error(StatusCode::UNAUTHORIZED, Some("invalid_token"), &e.public_description());
        }
    };

    let record = verified.record;
    if !record.scope.contains(scope::OPENID) {
        return bearer_error(
            StatusCode::FORBIDDEN,
            Some("insufficient_scope"),
            "the access token was not granted the openid scope",
        );
    }

    match state.provider.users().find_user(&record.subject).await {
        Ok(Some(user)) => ([(header::CACHE_CONTROL, "no-store")], Json(user.claims(&record.scope))).into_response(),
        Ok(None) => {
            tracing::warn!(subject = %record.subject, "UserInfo subject no longer exists");
            bearer_error(StatusCode::UNAUTHORIZED, Some("invalid_token"), "the end-user no longer exists")
        }
        Err(e) => oauth_error(&e, false),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// RFC 6750 Section 3 challenge. A request without credentials gets a bare
/// challenge and no error body.
fn bearer_error(status: StatusCode, error: Option<&str>, description: &str) -> Response {
    let Some(error) = error else {
        return (status, [(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))]).into_response();
    };

    let challenge = format!(
        "Bearer error=\"{error}\", error_description=\"{}\"",
        description.replace(['"', '\\'], "")
    );
    let challenge = HeaderValue::from_str(&challenge).unwrap_or_else(|_| HeaderValue::from_static("Bearer"));
    (
        status,
        [(header::WWW_AUTHENTICATE, challenge)],
        Json(json!({ "error": error, "error_description": description })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};

    use super::super::test_support::{body_json, grant_tokens, send, state};

    fn userinfo(token: &str) -> Request<Body> {
        Request::get("/userinfo")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_claims_follow_scope() {
        let state = state().await;
        let issued = grant_tokens(&state, "openid email").await;

        let response = send(&state, userinfo(&issued.access_token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["sub"], "alice");
        assert_eq!(body["email"], "alice@example.com");
        assert_eq!(body["email_verified"], true);
        assert!(body.get("name").is_none());
    }

    #[tokio::test]
    async fn test_missing_token_gets_bare_challenge() {
        let state = state().await;
        let response = send(&state, Request::get("/userinfo").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }

    #[tokio::test]
    async fn test_garbage_token_is_invalid_token() {
        let state = state().await;
        let response = send(&state, userinfo("not.a.jwt")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
        assert!(challenge.starts_with("Bearer error=\"invalid_token\""));
    }

    #[tokio::test]
    async fn test_token_without_openid_is_forbidden() {
        let state = state().await;
        let issued = grant_tokens(&state, "profile").await;
        let response = send(&state, userinfo(&issued.access_token)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"], "insufficient_scope");
    }

    #[tokio::test]
    async fn test_revoked_token_is_rejected() {
        let state = state().await;
        let issued = grant_tokens(&state, "openid").await;
        let client = state.provider.registry().lookup("foo").await.unwrap();
        state
            .provider
            .tokens()
            .revoke(&client, &issued.access_token, None)
            .await
            .unwrap();

        let response = send(&state, userinfo(&issued.access_token)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
