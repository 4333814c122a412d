//! Logout pipeline and back-channel client notification.
//!
//! `GET /login/logout` renders a CSRF-protected confirmation form.
//! `POST /login/logout` revokes every token of the session's user, fans a
//! `logoutToken` webhook out to the clients that ever issued the user a
//! token, deletes the session cookies, and redirects.
//!
//! Revocation is the one step that must not fail silently; the fan-out is
//! best effort and runs detached, bounded by a semaphore so a slow client
//! cannot stall the rest.

use axum::{
    extract::{Extension, Form, Query},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::chain::{Chain, Flow, Step, StepFuture};
use super::csrf::CsrfSecret;
use super::login::sanitize_origin;
use super::render::FormView;
use super::session::{SessionCookies, REFRESH_COOKIE, STATE_COOKIE};
use super::{cookies, AuthError, AuthState};
use crate::model::LogoutClient;

pub(crate) struct LogoutContext {
    state: Arc<AuthState>,
    redirect_uri: Option<String>,
    state_cookie: Option<String>,
    refresh_cookie: Option<String>,
    form: HashMap<String, String>,
    csrf_secret: Option<CsrfSecret>,
    response_headers: HeaderMap,
}

impl LogoutContext {
    fn new(
        state: Arc<AuthState>,
        query: &HashMap<String, String>,
        request_headers: &HeaderMap,
        form: HashMap<String, String>,
    ) -> Self {
        Self {
            redirect_uri: sanitize_origin(form.get("redirect_uri").map(String::as_str))
                .or_else(|| sanitize_origin(query.get("redirect_uri").map(String::as_str))),
            state_cookie: cookies::get(request_headers, STATE_COOKIE),
            refresh_cookie: cookies::get(request_headers, REFRESH_COOKIE),
            form,
            csrf_secret: None,
            response_headers: HeaderMap::new(),
            state,
        }
    }

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

        let mut hidden = vec![
            ("state", token),
            ("response_type", "logout".to_string()),
        ];
        if let Some(redirect_uri) = &self.redirect_uri {
            hidden.push(("redirect_uri", redirect_uri.clone()));
        }
        let html = FormView {
            action: &self.state.config().logout_path(),
            title: "Sign out",
            submit: "Sign out",
            error,
            hidden,
            credentials: false,
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
            warn!("logout failed: {detail}");
        }
        self.html(err.status, "internal error".to_string())
    }
}

fn require_session(cx: &mut LogoutContext) -> StepFuture<'_> {
    Box::pin(async move {
        if cx.refresh_cookie.is_some() {
            Ok(Flow::Continue)
        } else {
            Err(AuthError::invalid_token().with_status(StatusCode::FORBIDDEN))
        }
    })
}

fn ensure_csrf(cx: &mut LogoutContext) -> StepFuture<'_> {
    Box::pin(async move {
        let secret = cx
            .state
            .csrf()
            .ensure_secret(cx.state_cookie.as_deref())?;
        cx.csrf_secret = Some(secret);
        Ok(Flow::Continue)
    })
}

fn render_confirmation(cx: &mut LogoutContext) -> StepFuture<'_> {
    Box::pin(async move { Ok(Flow::Done(cx.form_response(StatusCode::OK, None))) })
}

fn verify_csrf(cx: &mut LogoutContext) -> StepFuture<'_> {
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

/// Revoke everything the user holds, notify their clients, clear cookies,
/// and redirect. Revocation failure aborts; notification failure does not.
fn revoke(cx: &mut LogoutContext) -> StepFuture<'_> {
    Box::pin(async move {
        let Some(refresh_token) = cx.refresh_cookie.as_deref() else {
            return Err(AuthError::invalid_request());
        };
        let user = cx
            .state
            .model()
            .revoke_all_tokens(None, Some(refresh_token))
            .await?
            .ok_or_else(|| {
                AuthError::invalid_grant().with_status(StatusCode::UNAUTHORIZED)
            })?;

        cx.state.model().last_sign_out_at(&user).await?;
        let clients = cx.state.model().logout_clients(&user).await?;
        info!(
            user = %user.username,
            clients = clients.len(),
            "tokens revoked, notifying clients"
        );

        let http = cx.state.http().clone();
        let timeout = cx.state.config().logout_timeout();
        let concurrency = cx.state.config().logout_concurrency();
        let logout_token = user.logout_token.clone();
        tokio::spawn(fan_out(dedup_by_uri(clients), concurrency, move |client| {
            notify_client(http.clone(), timeout, client, logout_token.clone())
        }));

        // Give the fan-out a head start so quick clients observe the
        // revocation before the browser lands on the next page.
        tokio::time::sleep(cx.state.config().logout_grace()).await;

        let rotated = cx.state.csrf().rotate()?;
        let session = SessionCookies::new(cx.state.config());
        session.set_state(&mut cx.response_headers, &rotated.value);
        session.delete(&mut cx.response_headers, true);

        let target = cx
            .redirect_uri
            .clone()
            .unwrap_or_else(|| cx.state.config().login_success_path().to_string());
        Ok(Flow::Done(cx.redirect(&target)))
    })
}

fn on_error(cx: &mut LogoutContext, err: AuthError) -> Response {
    if let Some(detail) = err.detail() {
        warn!("logout pipeline error: {detail}");
    } else {
        debug!(error = err.name(), "logout pipeline rejected request");
    }
    if err.name() == "bad_csrf_token" {
        match cx.state.csrf().rotate() {
            Ok(secret) => cx.csrf_secret = Some(secret),
            Err(rotate_err) => return cx.failure(rotate_err.into()),
        }
    }
    if err.is_soft() {
        cx.form_response(StatusCode::OK, Some(err.name()))
    } else {
        cx.failure(err)
    }
}

/// One webhook per distinct URI, whatever set of clients produced them.
fn dedup_by_uri(clients: Vec<LogoutClient>) -> Vec<LogoutClient> {
    let mut seen = HashSet::new();
    clients
        .into_iter()
        .filter(|client| seen.insert(client.logout_uri.clone()))
        .collect()
}

/// Run `op` over every item with at most `limit` in flight, resolving when
/// all have finished.
pub(crate) async fn fan_out<T, F, Fut>(items: Vec<T>, limit: usize, op: F)
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let op = Arc::new(op);
    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let op = Arc::clone(&op);
        handles.push(tokio::spawn(async move {
            op(item).await;
            drop(permit);
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

async fn notify_client(
    http: reqwest::Client,
    timeout: Duration,
    client: LogoutClient,
    logout_token: String,
) {
    let result = http
        .post(&client.logout_uri)
        .timeout(timeout)
        .json(&serde_json::json!({ "logoutToken": logout_token }))
        .send()
        .await;
    match result {
        Ok(response) if response.status().is_success() => {
            debug!(client = %client.client_id, "logout notification delivered");
        }
        Ok(response) => {
            warn!(
                client = %client.client_id,
                status = %response.status(),
                "logout notification rejected"
            );
        }
        Err(err) => {
            warn!(client = %client.client_id, "logout notification failed: {err}");
        }
    }
}

const GET_STEPS: &[Step<LogoutContext>] = &[require_session, ensure_csrf, render_confirmation];
const POST_STEPS: &[Step<LogoutContext>] = &[ensure_csrf, verify_csrf, revoke];

pub(crate) async fn get(
    Extension(state): Extension<Arc<AuthState>>,
    Query(query): Query<HashMap<String, String>>,
    request_headers: HeaderMap,
) -> Response {
    let mut cx = LogoutContext::new(state, &query, &request_headers, HashMap::new());
    Chain::new(GET_STEPS, on_error).run(&mut cx).await
}

pub(crate) async fn post(
    Extension(state): Extension<Arc<AuthState>>,
    Query(query): Query<HashMap<String, String>>,
    request_headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut cx = LogoutContext::new(state, &query, &request_headers, form);
    Chain::new(POST_STEPS, on_error).run(&mut cx).await
}
