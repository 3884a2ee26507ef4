//! Response builders shared by the endpoint handlers.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;

use super::templates::render_error_page;
use crate::error::AuthError;
use crate::oauth::token::ErrorResponse;

/// `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => error_page(&AuthError::internal("redirect location is not a valid header value")),
    }
}

/// JSON body that must not be cached (token, introspection responses).
pub fn json_no_store<T: Serialize>(status: StatusCode, body: &T) -> Response {
    (
        status,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(body),
    )
        .into_response()
}

/// RFC 6749 Section 5.2 error: `{error, error_description}` with 400, 401 or
/// 500. `basic_challenge` adds `WWW-Authenticate: Basic` to 401 responses.
pub fn oauth_error(error: &AuthError, basic_challenge: bool) -> Response {
    log_error(error);
    let body = ErrorResponse::from_error(error);
    let status = StatusCode::from_u16(body.http_status()).unwrap_or(StatusCode::BAD_REQUEST);

    let mut response = json_no_store(status, &body);
    if status == StatusCode::UNAUTHORIZED && basic_challenge {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"oidc\""),
        );
    }
    response
}

/// HTML error page, for authorization errors that must not be redirected.
pub fn error_page(error: &AuthError) -> Response {
    log_error(error);
    let status = if error.is_server_error() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_REQUEST
    };
    (
        status,
        [(header::CACHE_CONTROL, "no-store")],
        Html(render_error_page(error.oauth_error_code(), &error.public_description())),
    )
        .into_response()
}

/// HTML page that must not be cached (login and consent forms).
pub fn html_no_store(html: String) -> Response {
    ([(header::CACHE_CONTROL, "no-store")], Html(html)).into_response()
}

fn log_error(error: &AuthError) {
    if error.is_server_error() {
        tracing::error!(error = %error, category = ?error.category(), "Request failed");
    } else {
        tracing::debug!(error = %error, code = error.oauth_error_code(), "Request rejected");
    }
}
