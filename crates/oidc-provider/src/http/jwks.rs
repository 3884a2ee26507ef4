//! JWKS endpoint: the public halves of every active and retired signing key.

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use super::OidcState;

/// Handler for `GET /jwks`.
///
/// Retired keys stay listed while they can still verify tokens. The cache
/// lifetime is short so relying parties pick up a new key soon after
/// rotation.
pub async fn jwks_handler(State(state): State<OidcState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=300")],
        Json(state.provider.keys().jwks()),
    )
}
