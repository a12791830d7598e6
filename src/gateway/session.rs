//! Session boundary — login, register, logout, and the session cookie.
//!
//! The only writer of the session cookie lives here. Login and register
//! mint an identity token and hand it to the browser as a secure http-only
//! cookie; logout overwrites it with `Max-Age=0`. Authentication failures
//! are always redirects with an error flag, never raw error pages, and
//! they never reveal which of username/password was wrong.

use std::sync::Arc;

use axum::{
    Form,
    extract::{Query, State},
    http::header,
    response::{Html, Response},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::SessionConfig;
use crate::credentials::CredentialError;
use crate::token::Role;

use super::bridge::LOGIN_PATH;
use super::redirect_found;
use super::router::AppState;

/// Register page path
pub const REGISTER_PATH: &str = "/auth/register";

/// Login form fields
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    /// Username
    pub username: String,
    /// Clear-text password (compared against the stored hash, never kept)
    pub password: String,
    /// Where to land after login; honored only for same-origin absolute paths
    pub redirect: Option<String>,
}

/// Register form fields
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    /// Username (must be unique)
    pub username: String,
    /// Clear-text password
    pub password: String,
    /// Role for the new user
    pub role: Role,
    /// Where to land after registration
    pub redirect: Option<String>,
}

/// Query parameters shared by the auth pages
#[derive(Debug, Default, Deserialize)]
pub struct AuthPageQuery {
    /// Original destination to return to after authenticating
    pub redirect: Option<String>,
    /// Error flag (`?error` or `?error=exists`)
    pub error: Option<String>,
    /// Set after logout to show a confirmation banner
    pub logout: Option<String>,
}

/// GET / — the platform has no root page; send users to login.
pub async fn home() -> Response {
    redirect_found(LOGIN_PATH)
}

/// GET /auth/login
pub async fn login_page(Query(query): Query<AuthPageQuery>) -> Html<String> {
    let banner = if query.error.is_some() {
        r#"<p class="error">Invalid username or password.</p>"#
    } else if query.logout.is_some() {
        r#"<p class="info">You have been signed out.</p>"#
    } else {
        ""
    };
    Html(auth_page(
        "Sign in",
        LOGIN_PATH,
        banner,
        query.redirect.as_deref(),
        false,
    ))
}

/// GET /auth/register
pub async fn register_page(Query(query): Query<AuthPageQuery>) -> Html<String> {
    let banner = if query.error.as_deref() == Some("exists") {
        r#"<p class="error">That username is already taken.</p>"#
    } else if query.error.is_some() {
        r#"<p class="error">Registration failed.</p>"#
    } else {
        ""
    };
    Html(auth_page(
        "Create account",
        REGISTER_PATH,
        banner,
        query.redirect.as_deref(),
        true,
    ))
}

/// POST /auth/login
pub async fn login(State(state): State<Arc<AppState>>, Form(form): Form<LoginForm>) -> Response {
    if !state
        .users
        .validate_credentials(&form.username, &form.password)
        .await
    {
        warn!(username = %form.username, "Login failed");
        return redirect_found(&format!("{LOGIN_PATH}?error"));
    }

    let Some(user) = state.users.find_by_username(&form.username).await else {
        // Validated a moment ago but gone now; treat as a plain auth failure.
        warn!(username = %form.username, "User vanished after validation");
        return redirect_found(&format!("{LOGIN_PATH}?error"));
    };

    info!(username = %user.username, "Login succeeded");
    open_session(&state, &user.username, user.role, form.redirect.as_deref())
}

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RegisterForm>,
) -> Response {
    match state
        .users
        .create(&form.username, &form.password, form.role)
        .await
    {
        Ok(user) => {
            info!(username = %user.username, role = ?user.role, "Registered and signed in");
            open_session(&state, &user.username, user.role, form.redirect.as_deref())
        }
        Err(CredentialError::UsernameTaken(_)) => {
            warn!(username = %form.username, "Registration rejected: username taken");
            redirect_found(&format!("{REGISTER_PATH}?error=exists"))
        }
        Err(e) => {
            error!(username = %form.username, error = %e, "Registration failed");
            redirect_found(&format!("{REGISTER_PATH}?error"))
        }
    }
}

/// POST /auth/logout — idempotent; expires the cookie whether or not a
/// session existed, with no backend call.
pub async fn logout(State(state): State<Arc<AppState>>) -> Response {
    let cookie = expired_cookie(&state.session);
    with_cookie(redirect_found(&format!("{LOGIN_PATH}?logout")), &cookie)
}

/// Issue a token, set the session cookie, and redirect to the destination.
fn open_session(state: &AppState, username: &str, role: Role, redirect: Option<&str>) -> Response {
    let token = match state.tokens.issue(username, &[role]) {
        Ok(token) => token,
        Err(e) => {
            error!(username = %username, error = %e, "Token issuance failed");
            return redirect_found(&format!("{LOGIN_PATH}?error"));
        }
    };

    let cookie = session_cookie(&state.session, &token, state.tokens.ttl_seconds());
    let target = sanitize_redirect(redirect, &state.session.default_landing);
    with_cookie(redirect_found(&target), &cookie)
}

/// `Set-Cookie` value carrying the serialized token
#[must_use]
pub fn session_cookie(config: &SessionConfig, token: &str, max_age: u64) -> String {
    format_cookie(config, token, max_age)
}

/// `Set-Cookie` value that destroys the session cookie
#[must_use]
pub fn expired_cookie(config: &SessionConfig) -> String {
    format_cookie(config, "", 0)
}

fn format_cookie(config: &SessionConfig, value: &str, max_age: u64) -> String {
    let mut cookie = format!(
        "{}={value}; Max-Age={max_age}; Path=/; HttpOnly; SameSite={}",
        config.cookie_name, config.cookie_same_site
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Honor the caller-supplied redirect only when it is a same-origin absolute
/// path. `//host/...` is scheme-relative and would leave the origin.
#[must_use]
pub fn sanitize_redirect(redirect: Option<&str>, default_landing: &str) -> String {
    match redirect {
        Some(r) if r.starts_with('/') && !r.starts_with("//") => r.to_string(),
        _ => default_landing.to_string(),
    }
}

fn with_cookie(mut response: Response, cookie: &str) -> Response {
    match header::HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
            response
        }
        Err(e) => {
            error!(error = %e, "Session cookie not representable as a header");
            redirect_found(&format!("{LOGIN_PATH}?error"))
        }
    }
}

/// Minimal inline auth page. The real UI lives behind the `/ui` proxy; this
/// form only has to collect credentials and carry the `redirect` parameter.
fn auth_page(
    title: &str,
    action: &str,
    banner: &str,
    redirect: Option<&str>,
    with_role: bool,
) -> String {
    let redirect_field = redirect
        .map(|r| {
            format!(
                r#"<input type="hidden" name="redirect" value="{}">"#,
                html_escape(r)
            )
        })
        .unwrap_or_default();

    let role_field = if with_role {
        r#"<label>Role
  <select name="role">
    <option value="organizer">Organizer</option>
    <option value="practitioner">Practitioner</option>
  </select>
</label>"#
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
  body {{ font-family: sans-serif; max-width: 22rem; margin: 4rem auto; }}
  label {{ display: block; margin: .6rem 0; }}
  .error {{ color: #b00020; }}
  .info {{ color: #1b5e20; }}
</style>
</head>
<body>
<h1>{title}</h1>
{banner}
<form method="post" action="{action}">
  <label>Username <input name="username" required autofocus></label>
  <label>Password <input name="password" type="password" required></label>
  {role_field}
  {redirect_field}
  <button type="submit">{title}</button>
</form>
</body>
</html>
"#
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
