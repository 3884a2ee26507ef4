//! Authorization endpoint handlers.
//!
//! # Flow
//!
//! ```text
//! GET /authorize?response_type=code&client_id=...&redirect_uri=...&state=...
//!     ├─► Unknown client / bad redirect_uri → error page (no redirect)
//!     ├─► Other invalid parameters → 302 redirect_uri?error=...&state=...
//!     ├─► No login session → login page
//!     ├─► Logged in, no consent → consent page
//!     └─► Logged in, consent on file → 302 redirect_uri?code=...&state=...
//!
//! POST /authorize (form: action, flow_id[, username, password])
//!     ├─► action=login   → consent page, 302 with code, or login page again
//!     ├─► action=approve → 302 with code
//!     └─► action=deny    → 302 with error=access_denied
//! ```

use axum::Form;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use cookie::{Cookie, SameSite};
use serde::Deserialize;
use time::OffsetDateTime;

use super::response::{error_page, found, html_no_store};
use super::templates::{render_consent_form, render_login_form};
use super::{OidcState, SESSION_COOKIE};
use crate::error::AuthError;
use crate::oauth::authorize::AuthorizationRequest;
use crate::oauth::service::{AuthorizeFailure, FlowStep};
use crate::types::LoginSession;

/// Form posted by the login and consent pages.
#[derive(Debug, Deserialize)]
pub struct InteractionForm {
    /// `login`, `approve` or `deny`.
    pub action: String,
    /// Pending flow from the hidden form field.
    pub flow_id: String,
    /// Username (for `action=login`).
    #[serde(default)]
    pub username: Option<String>,
    /// Password (for `action=login`).
    #[serde(default)]
    pub password: Option<String>,
}

/// `GET /authorize`.
pub async fn authorize_get(
    State(state): State<OidcState>,
    jar: CookieJar,
    query: Result<Query<AuthorizationRequest>, QueryRejection>,
) -> Response {
    let Query(request) = match query {
        Ok(query) => query,
        Err(rejection) => return error_page(&AuthError::invalid_request(rejection.body_text())),
    };

    let session = jar.get(SESSION_COOKIE).map(Cookie::value);
    let result = state.provider.authorization().begin(&request, session).await;
    render(result)
}

/// `POST /authorize`: login and consent form submissions.
pub async fn authorize_post(
    State(state): State<OidcState>,
    jar: CookieJar,
    form: Result<Form<InteractionForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => return error_page(&AuthError::invalid_request(rejection.body_text())),
    };
    let authorization = state.provider.authorization();

    match form.action.as_str() {
        "login" => {
            let username = form.username.as_deref().unwrap_or_default();
            let password = form.password.as_deref().unwrap_or_default();
            match authorization.login(&form.flow_id, username, password).await {
                Ok(outcome) => {
                    let page = render(Ok(outcome.step));
                    match outcome.session {
                        Some(session) => {
                            (jar.add(session_cookie(&session, state.secure_cookies)), page).into_response()
                        }
                        None => page,
                    }
                }
                Err(failure) => render(Err(failure)),
            }
        }
        "approve" => render(authorization.approve(&form.flow_id).await.map(FlowStep::Redirect)),
        "deny" => render(authorization.deny(&form.flow_id).await.map(FlowStep::Redirect)),
        other => {
            tracing::debug!(action = %other, "Unknown authorization form action");
            error_page(&AuthError::invalid_request("unknown form action"))
        }
    }
}

fn render(result: Result<FlowStep, AuthorizeFailure>) -> Response {
    match result {
        Ok(FlowStep::Login { flow, error }) => html_no_store(render_login_form(
            &flow.request.client_name,
            &flow.id,
            error.as_deref(),
        )),
        Ok(FlowStep::Consent { flow }) => {
            let scopes: Vec<&str> = flow.request.scope.iter().collect();
            html_no_store(render_consent_form(
                &flow.request.client_name,
                &flow.request.redirect_uri,
                &scopes,
                &flow.id,
            ))
        }
        Ok(FlowStep::Redirect(redirect)) | Err(AuthorizeFailure::Redirect(redirect)) => {
            found(&redirect.location)
        }
        Err(AuthorizeFailure::Direct(error)) => error_page(&error),
    }
}

fn session_cookie(session: &LoginSession, secure: bool) -> Cookie<'static> {
    let max_age = (session.expires_at - OffsetDateTime::now_utc()).max(time::Duration::ZERO);
    Cookie::build((SESSION_COOKIE, session.id.clone()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}
