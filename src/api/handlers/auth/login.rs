//! Login pipeline.
//!
//! `GET /login` renders the form, first trying to resume the session from
//! the `refresh` cookie. `POST /login` verifies the double-submitted CSRF
//! pair, exchanges the credentials for a token pair through the grant
//! backend, rotates the CSRF secret, and redirects to the sanitized origin.

use axum::{
    extract::{Extension, Form, Query},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::chain::{Chain, Flow, Step, StepFuture};
use super::csrf::CsrfSecret;
use super::render::FormView;
use super::session::{SessionCookies, REFRESH_COOKIE, STATE_COOKIE};
use super::{cookies, AuthError, AuthState};
use crate::grant::TokenRequest;

/// Marker appended to post-login redirects so the authorize endpoint can
/// tell a fresh session from a stale one and avoid a redirect loop.
pub(crate) const LOGIN_MARKER: &str = "_login=1";

pub(crate) struct LoginContext {
    state: Arc<AuthState>,
    origin: Option<String>,
    state_cookie: Option<String>,
    refresh_cookie: Option<String>,
    form: HashMap<String, String>,
    csrf_secret: Option<CsrfSecret>,
    response_headers: HeaderMap,
}

impl LoginContext {
    fn new(
        state: Arc<AuthState>,
        query: &HashMap<String, String>,
        request_headers: &HeaderMap,
        form: HashMap<String, String>,
    ) -> Self {
        Self {
            origin: sanitize_origin(query.get("origin").map(String::as_str))
                .or_else(|| sanitize_origin(form.get("origin").map(String::as_str))),
            state_cookie: cookies::get(request_headers, STATE_COOKIE),
            refresh_cookie: cookies::get(request_headers, REFRESH_COOKIE),
            form,
            csrf_secret: None,
            response_headers: HeaderMap::new(),
            state,
        }
    }

    fn remember(&self) -> bool {
        self.form.get("remember").is_some_and(|value| value == "on")
    }

    fn redirect_target(&self) -> &str {
        self.origin
            .as_deref()
            .unwrap_or_else(|| self.state.config().login_success_path())
    }

    /// Render the login form, setting the `state` cookie when the CSRF
    /// secret was minted on this request.
    fn form_response(&mut self, status: StatusCode, error: Option<&str>) -> Response {
        let secret = match self.csrf_secret.clone() {
            Some(secret) => secret,
            None => match self.state.csrf().ensure_secret(None) {
                Ok(secret) => secret,
                Err(err) => return self.failure(err.into()),
            },
        };
        let token = match self.state.csrf().mint_token(&secret) {
            Ok(token) => token,
            Err(err) => return self.failure(err.into()),
        };
        if secret.fresh {
            SessionCookies::new(self.state.config())
                .set_state(&mut self.response_headers, &secret.value);
            self.csrf_secret = Some(CsrfSecret {
                fresh: false,
                ..secret
            });
        }

        let mut hidden = vec![("state", token)];
        if let Some(origin) = &self.origin {
            hidden.push(("origin", origin.clone()));
        }
        let html = FormView {
            action: self.state.config().login_path(),
            title: "Sign in",
            submit: "Sign in",
            error,
            hidden,
            credentials: true,
        }
        .render();
        self.html(status, html)
    }

    fn html(&mut self, status: StatusCode, body: String) -> Response {
        let mut response = (status, body).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        response
            .headers_mut()
            .extend(std::mem::take(&mut self.response_headers));
        response
    }

    fn redirect(&mut self, location: &str) -> Response {
        let mut response = StatusCode::FOUND.into_response();
        if let Ok(value) = HeaderValue::from_str(location) {
            response.headers_mut().insert(header::LOCATION, value);
        }
        response
            .headers_mut()
            .extend(std::mem::take(&mut self.response_headers));
        response
    }

    fn failure(&mut self, err: AuthError) -> Response {
        if let Some(detail) = err.detail() {
            warn!("login failed: {detail}");
        }
        self.html(err.status, "internal error".to_string())
    }
}

/// Only relative paths survive; anything with an authority component could
/// bounce the browser off-site after login.
pub(crate) fn sanitize_origin(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    if raw.starts_with('/') && !raw.starts_with("//") && !raw.contains('\\') {
        Some(raw.to_string())
    } else {
        None
    }
}

/// Append a query parameter regardless of whether the target already has a
/// query string.
pub(crate) fn with_query(target: &str, param: &str) -> String {
    if target.contains('?') {
        format!("{target}&{param}")
    } else {
        format!("{target}?{param}")
    }
}

fn ensure_csrf(cx: &mut LoginContext) -> StepFuture<'_> {
    Box::pin(async move {
        let secret = cx
            .state
            .csrf()
            .ensure_secret(cx.state_cookie.as_deref())?;
        cx.csrf_secret = Some(secret);
        Ok(Flow::Continue)
    })
}

/// Resume the session from the `refresh` cookie if one verifies. A dead
/// cookie renders the form with `session_expired` instead of failing hard.
fn refresh_grant(cx: &mut LoginContext) -> StepFuture<'_> {
    Box::pin(async move {
        let Some(refresh_token) = cx.refresh_cookie.clone() else {
            return Ok(Flow::Continue);
        };
        let request = TokenRequest {
            grant_type: "refresh_token".to_string(),
            refresh_token: Some(refresh_token),
            client_id: cx.state.config().login_client_id().to_string(),
            client_secret: cx
                .state
                .config()
                .login_client_secret()
                .expose_secret()
                .to_string(),
            ..TokenRequest::default()
        };
        match cx.state.grant().token(&request).await {
            Ok(token) => {
                debug!(user = %token.user.username, "session resumed from refresh token");
                SessionCookies::new(cx.state.config()).set(
                    &mut cx.response_headers,
                    &token,
                    false,
                )?;
                cx.response_headers.insert(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-store"),
                );
                cx.response_headers
                    .insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
                let target = with_query(cx.redirect_target(), LOGIN_MARKER);
                Ok(Flow::Done(cx.redirect(&target)))
            }
            Err(err) if err.is_soft() => {
                debug!("refresh cookie no longer grants a session");
                Err(AuthError::session_expired())
            }
            Err(err) => Err(err),
        }
    })
}

fn render_form(cx: &mut LoginContext) -> StepFuture<'_> {
    Box::pin(async move { Ok(Flow::Done(cx.form_response(StatusCode::OK, None))) })
}

fn verify_csrf(cx: &mut LoginContext) -> StepFuture<'_> {
    Box::pin(async move {
        let verified = cx.state.csrf().verify(
            cx.state_cookie.as_deref(),
            cx.form.get("state").map(String::as_str),
        );
        if verified {
            Ok(Flow::Continue)
        } else {
            Err(AuthError::bad_csrf_token())
        }
    })
}

fn verify_body(cx: &mut LoginContext) -> StepFuture<'_> {
    Box::pin(async move {
        let has_username = cx.form.get("username").is_some_and(|v| !v.is_empty());
        let has_password = cx.form.get("password").is_some_and(|v| !v.is_empty());
        if has_username && has_password {
            Ok(Flow::Continue)
        } else {
            Err(AuthError::invalid_grant())
        }
    })
}

fn exchange(cx: &mut LoginContext) -> StepFuture<'_> {
    Box::pin(async move {
        let request = TokenRequest {
            grant_type: "password".to_string(),
            username: cx.form.get("username").cloned(),
            password: cx.form.get("password").cloned(),
            client_id: cx.state.config().login_client_id().to_string(),
            client_secret: cx
                .state
                .config()
                .login_client_secret()
                .expose_secret()
                .to_string(),
            ..TokenRequest::default()
        };
        let token = cx.state.grant().token(&request).await?;

        let remember = cx.remember();
        cx.state
            .model()
            .last_sign_in_at(&token.user, remember)
            .await?;

        // The secret that authorized this POST is spent; mint a replacement
        // before the response leaves.
        let rotated = cx.state.csrf().rotate()?;
        SessionCookies::new(cx.state.config())
            .set_state(&mut cx.response_headers, &rotated.value);
        SessionCookies::new(cx.state.config()).set(&mut cx.response_headers, &token, remember)?;

        info!(user = %token.user.username, remember, "sign-in completed");
        let target = cx.redirect_target().to_string();
        Ok(Flow::Done(cx.redirect(&target)))
    })
}

/// Soft errors re-render the form with the error name; hard errors keep
/// their status but use the same shape so the browser always gets a page.
fn on_error(cx: &mut LoginContext, err: AuthError) -> Response {
    if let Some(detail) = err.detail() {
        warn!("login pipeline error: {detail}");
    } else {
        debug!(error = err.name(), "login pipeline rejected request");
    }
    // A rejected CSRF pair means the presented secret is spent or forged;
    // never hand it back.
    if err.name() == "bad_csrf_token" {
        match cx.state.csrf().rotate() {
            Ok(secret) => cx.csrf_secret = Some(secret),
            Err(rotate_err) => return cx.failure(rotate_err.into()),
        }
    }
    let status = if err.is_soft() {
        StatusCode::OK
    } else {
        err.status
    };
    cx.form_response(status, Some(err.name()))
}

const GET_STEPS: &[Step<LoginContext>] = &[ensure_csrf, refresh_grant, render_form];
const POST_STEPS: &[Step<LoginContext>] =
    &[ensure_csrf, verify_csrf, verify_body, exchange];

pub(crate) async fn get(
    Extension(state): Extension<Arc<AuthState>>,
    Query(query): Query<HashMap<String, String>>,
    request_headers: HeaderMap,
) -> Response {
    let mut cx = LoginContext::new(state, &query, &request_headers, HashMap::new());
    Chain::new(GET_STEPS, on_error).run(&mut cx).await
}

pub(crate) async fn post(
    Extension(state): Extension<Arc<AuthState>>,
    Query(query): Query<HashMap<String, String>>,
    request_headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut cx = LoginContext::new(state, &query, &request_headers, form);
    Chain::new(POST_STEPS, on_error).run(&mut cx).await
}
