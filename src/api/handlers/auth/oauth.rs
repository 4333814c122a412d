//! Authorize and token endpoints.
//!
//! The authorize endpoint bridges browser sessions into the OAuth2 code
//! flow: the `access` cookie stands in for a bearer header, an
//! unauthenticated request bounces to the login form with its own URL as
//! the origin, and `response_type=logout` is intercepted and forwarded to
//! the logout confirmation page.
//!
//! The token endpoint speaks JSON to confidential clients and never caches.

use axum::{
    extract::{Extension, OriginalUri, Query, RawForm},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64ct::{Base64, Encoding};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use url::form_urlencoded;

use super::login::{with_query, LOGIN_MARKER};
use super::session::ACCESS_COOKIE;
use super::{cookies, AuthError, AuthState};
use crate::grant::{AuthorizeRequest, TokenRequest};
use crate::model::GrantedToken;

/// Bearer credential for the authorize endpoint: the `Authorization` header
/// wins, the `access` cookie is the browser fallback.
fn bearer(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    from_header.or_else(|| cookies::get(headers, ACCESS_COOKIE))
}

fn redirect(location: &str) -> Response {
    let mut response = StatusCode::FOUND.into_response();
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

fn login_redirect(state: &AuthState, origin: &str) -> Response {
    let encoded: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("origin", origin)
        .finish();
    redirect(&format!("{}?{}", state.config().login_path(), encoded))
}

/// Error redirect back to the relying party, carrying the OAuth2 error name
/// and the opaque `state` the client sent.
fn error_redirect(query: &HashMap<String, String>, err: &AuthError) -> Response {
    let target = query
        .get("redirect_uri")
        .map_or("/", String::as_str);
    let mut params = form_urlencoded::Serializer::new(String::new());
    params.append_pair("error", err.name());
    if let Some(detail) = err.detail() {
        params.append_pair("error_description", detail);
    }
    if let Some(client_state) = query.get("state") {
        params.append_pair("state", client_state);
    }
    redirect(&with_query(target, &params.finish()))
}

pub(crate) async fn authorize(
    Extension(state): Extension<Arc<AuthState>>,
    Query(query): Query<HashMap<String, String>>,
    OriginalUri(original_uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    // Logout piggybacks on the authorize URL so relying parties only need
    // one endpoint; forward it to the confirmation page.
    if query.get("response_type").map(String::as_str) == Some("logout") {
        let logout_path = state.config().logout_path();
        let target = match query.get("redirect_uri") {
            Some(redirect_uri) => {
                let encoded: String = form_urlencoded::Serializer::new(String::new())
                    .append_pair("redirect_uri", redirect_uri)
                    .finish();
                format!("{logout_path}?{encoded}")
            }
            None => logout_path,
        };
        return redirect(&target);
    }

    let origin = original_uri.to_string();
    let Some(bearer) = bearer(&headers) else {
        debug!("authorize without credentials, sending to login");
        return login_redirect(&state, &origin);
    };

    let request = AuthorizeRequest {
        response_type: query
            .get("response_type")
            .cloned()
            .unwrap_or_default(),
        client_id: query.get("client_id").cloned().unwrap_or_default(),
        redirect_uri: query.get("redirect_uri").cloned().unwrap_or_default(),
        scope: query.get("scope").cloned(),
        state: query.get("state").cloned(),
    };

    match state.grant().authorize(&request, &bearer).await {
        Ok(issued) => {
            let mut params = form_urlencoded::Serializer::new(String::new());
            params.append_pair("code", &issued.code);
            if let Some(client_state) = &request.state {
                params.append_pair("state", client_state);
            }
            redirect(&with_query(&issued.redirect_uri, &params.finish()))
        }
        // A dead session goes back through login, unless we just came from
        // there; the marker breaks the loop.
        Err(err)
            if err.name() == "invalid_token" && !origin.contains(LOGIN_MARKER) =>
        {
            debug!("authorize with stale credentials, sending to login");
            login_redirect(&state, &origin)
        }
        Err(err) => {
            warn!(error = err.name(), "authorize rejected");
            error_redirect(&query, &err)
        }
    }
}

/// Client credentials for the token endpoint: HTTP Basic wins, form
/// parameters are the fallback.
fn client_credentials(
    headers: &HeaderMap,
    form: &HashMap<String, String>,
) -> (String, String) {
    let basic = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|encoded| Base64::decode_vec(encoded).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .and_then(|pair| {
            pair.split_once(':')
                .map(|(id, secret)| (id.to_string(), secret.to_string()))
        });
    basic.unwrap_or_else(|| {
        (
            form.get("client_id").cloned().unwrap_or_default(),
            form.get("client_secret").cloned().unwrap_or_default(),
        )
    })
}

fn token_json(token: &GrantedToken) -> serde_json::Value {
    let expires_in = (token.access_token_expires_at - Utc::now())
        .num_seconds()
        .max(0);
    let mut body = serde_json::json!({
        "token_type": "bearer",
        "access_token": token.access_token,
        "expires_in": expires_in,
    });
    if let Some(refresh_token) = &token.refresh_token {
        body["refresh_token"] = serde_json::Value::String(refresh_token.clone());
    }
    if let Some(scope) = &token.scope {
        body["scope"] = serde_json::Value::String(scope.clone());
    }
    body
}

pub(crate) async fn token(
    Extension(state): Extension<Arc<AuthState>>,
    headers: HeaderMap,
    RawForm(body): RawForm,
) -> Response {
    let form: HashMap<String, String> = form_urlencoded::parse(&body)
        .into_owned()
        .collect();
    let (client_id, client_secret) = client_credentials(&headers, &form);
    let request = TokenRequest {
        grant_type: form.get("grant_type").cloned().unwrap_or_default(),
        username: form.get("username").cloned(),
        password: form.get("password").cloned(),
        refresh_token: form.get("refresh_token").cloned(),
        code: form.get("code").cloned(),
        redirect_uri: form.get("redirect_uri").cloned(),
        scope: form.get("scope").cloned(),
        client_id,
        client_secret,
    };

    let mut response = match state.grant().token(&request).await {
        Ok(token) => (StatusCode::OK, Json(token_json(&token))).into_response(),
        Err(err) => {
            debug!(error = err.name(), "token exchange rejected");
            let mut body = serde_json::json!({ "error": err.name() });
            if let Some(detail) = err.detail() {
                body["error_description"] = serde_json::Value::String(detail.to_string());
            }
            if let Some(client_state) = form.get("state") {
                body["state"] = serde_json::Value::String(client_state.clone());
            }
            (err.status, Json(body)).into_response()
        }
    };

    // Token responses carry credentials; RFC 6749 requires no-store.
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );
    response
        .headers_mut()
        .insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}
