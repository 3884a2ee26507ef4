//! End of the browser login session (`GET|POST /logout`).
//!
//! Deletes the login session named by the session cookie and expires the
//! cookie. Tokens already issued stay valid until they expire or are
//! revoked.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use cookie::Cookie;

use super::response::{html_no_store, oauth_error};
use super::templates::render_signed_out_page;
use super::{OidcState, SESSION_COOKIE};

/// `GET|POST /logout`.
pub async fn logout_handler(State(state): State<OidcState>, jar: CookieJar) -> Response {
    if let Some(session) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        if let Err(e) = state.provider.authorization().logout(&session).await {
            return oauth_error(&e, false);
        }
        tracing::info!("Login session ended");
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, html_no_store(render_signed_out_page())).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};

    use super::super::test_support::{body_string, flow_id, form, send, state};

    const AUTHORIZE: &str =
        "/authorize?response_type=code&client_id=foo&redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcb";

    #[tokio::test]
    async fn test_logout_ends_session() {
        let state = state().await;
        let page = body_string(send(&state, Request::get(AUTHORIZE).body(Body::empty()).unwrap()).await).await;
        let flow = flow_id(&page);
        let response = send(
            &state,
            form(
                "/authorize",
                format!("action=login&flow_id={flow}&username=alice&password=wonderland"),
            ),
        )
        .await;
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        let session = cookie.split(';').next().unwrap().to_string();

        let response = send(
            &state,
            Request::get("/logout")
                .header(header::COOKIE, session.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let cleared = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cleared.starts_with("oidc_session="));
        assert!(cleared.contains("Max-Age=0"));

        // The stale cookie no longer logs the user in.
        let response = send(
            &state,
            Request::get(AUTHORIZE)
                .header(header::COOKIE, session)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("name=\"password\""));
    }

    #[tokio::test]
    async fn test_logout_without_session() {
        let state = state().await;
        let response = send(&state, Request::post("/logout").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
