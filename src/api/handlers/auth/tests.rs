//! End-to-end flow tests over the full router with an in-memory model.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use regex::Regex;
use secrecy::SecretString;
use std::sync::Arc;
use tower::ServiceExt;

use crate::api;
use crate::grant::ModelBackend;
use crate::model::{ClientRecord, MemoryModel, Model};

use super::{AuthConfig, AuthState};

const LOGIN_CLIENT_ID: &str = "login-app";
const LOGIN_CLIENT_SECRET: &str = "login-secret";
const DEMO_CLIENT_ID: &str = "demo-app";
const DEMO_CLIENT_SECRET: &str = "demo-secret";
const DEMO_REDIRECT_URI: &str = "http://localhost:3000/callback";

async fn seeded_model() -> Arc<MemoryModel> {
    let model = Arc::new(MemoryModel::new());
    model
        .add_client(
            ClientRecord {
                client_id: LOGIN_CLIENT_ID.to_string(),
                redirect_uris: vec![],
                grants: vec!["password".to_string(), "refresh_token".to_string()],
                logout_uri: None,
            },
            LOGIN_CLIENT_SECRET,
        )
        .await;
    model
        .add_client(
            ClientRecord {
                client_id: DEMO_CLIENT_ID.to_string(),
                redirect_uris: vec![DEMO_REDIRECT_URI.to_string()],
                grants: vec![
                    "password".to_string(),
                    "authorization_code".to_string(),
                ],
                logout_uri: Some("http://localhost:3000/logout".to_string()),
            },
            DEMO_CLIENT_SECRET,
        )
        .await;
    model
        .add_user("admin@admin", "admin", Some("read"))
        .await
        .unwrap();
    model
}

async fn app() -> Router {
    let model = seeded_model().await;
    let config = AuthConfig::new(
        "http://localhost:8080".to_string(),
        LOGIN_CLIENT_ID.to_string(),
        SecretString::from(LOGIN_CLIENT_SECRET.to_string()),
        SecretString::from("csrf-master-secret".to_string()),
    )
    .with_development(true)
    .with_logout_grace(std::time::Duration::from_millis(0));
    let grant = ModelBackend::new(
        model.clone() as Arc<dyn Model>,
        SecretString::from("token-secret".to_string()),
    );
    let state = AuthState::new(config, model, Arc::new(grant)).unwrap();
    api::router(Arc::new(state))
}

/// Full `Set-Cookie` line for the named cookie.
fn set_cookie(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|line| line.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

fn cookie_value(line: &str) -> String {
    line.split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value.to_string())
        .unwrap_or_default()
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn hidden_state(html: &str) -> String {
    let re = Regex::new(r#"name="state" value="([^"]+)""#).unwrap();
    re.captures(html)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default()
}

fn form_request(uri: &str, cookies: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, cookies)
        .body(Body::from(body))
        .unwrap()
}

/// GET the login form and return (state cookie value, hidden form token).
async fn login_form(app: &Router) -> (String, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/login")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let state_cookie = cookie_value(&set_cookie(&response, "state").unwrap());
    let token = hidden_state(&body_string(response).await);
    assert!(!token.is_empty());
    (state_cookie, token)
}

/// Run the full login flow and return (access value, refresh value, state value).
async fn sign_in(app: &Router, remember: bool) -> (String, String, String) {
    let (state_cookie, token) = login_form(app).await;
    let mut body = format!("username=admin%40admin&password=admin&state={token}");
    if remember {
        body.push_str("&remember=on");
    }
    let response = app
        .clone()
        .oneshot(form_request(
            "/login",
            &format!("state={state_cookie}"),
            body,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let access = cookie_value(&set_cookie(&response, "access").unwrap());
    let refresh = cookie_value(&set_cookie(&response, "refresh").unwrap());
    let state = cookie_value(&set_cookie(&response, "state").unwrap());
    (access, refresh, state)
}

#[tokio::test]
async fn token_endpoint_password_grant() {
    let app = app().await;
    let body = format!(
        "grant_type=password&username=admin%40admin&password=admin\
         &client_id={DEMO_CLIENT_ID}&client_secret={DEMO_CLIENT_SECRET}"
    );
    let response = app
        .clone()
        .oneshot(form_request("/oauth/token", "", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
    let json: serde_json::Value =
        serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["token_type"], "bearer");
    assert!(json["access_token"].as_str().unwrap().len() >= 20);
    assert!(json["refresh_token"].as_str().is_some());
    assert!(json["expires_in"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn token_endpoint_rejects_bad_credentials() {
    let app = app().await;
    let body = format!(
        "grant_type=password&username=admin%40admin&password=wrong\
         &client_id={DEMO_CLIENT_ID}&client_secret={DEMO_CLIENT_SECRET}&state=xyz"
    );
    let response = app
        .clone()
        .oneshot(form_request("/oauth/token", "", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value =
        serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["error"], "invalid_grant");
    assert_eq!(json["state"], "xyz");
}

#[tokio::test]
async fn login_form_sets_state_cookie_and_hidden_token() {
    let app = app().await;
    let (state_cookie, token) = login_form(&app).await;
    assert!(!state_cookie.is_empty());
    // The hidden token is derived from the secret, never the secret itself.
    assert_ne!(state_cookie, token);
}

#[tokio::test]
async fn login_sets_session_cookies_and_redirects() {
    let app = app().await;
    let (state_cookie, token) = login_form(&app).await;
    let response = app
        .clone()
        .oneshot(form_request(
            "/login",
            &format!("state={state_cookie}"),
            format!("username=admin%40admin&password=admin&state={token}"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/");

    let access = set_cookie(&response, "access").unwrap();
    assert!(access.contains("Path=/oauth"));
    assert!(access.contains("Expires="));
    let refresh = set_cookie(&response, "refresh").unwrap();
    assert!(refresh.contains("Path=/login"));
    // The CSRF secret that authorized the POST must not survive it.
    let rotated = cookie_value(&set_cookie(&response, "state").unwrap());
    assert_ne!(rotated, state_cookie);
}

#[tokio::test]
async fn remember_controls_refresh_cookie_persistence() {
    let app = app().await;

    let (state_cookie, token) = login_form(&app).await;
    let response = app
        .clone()
        .oneshot(form_request(
            "/login",
            &format!("state={state_cookie}"),
            format!("username=admin%40admin&password=admin&state={token}&remember=on"),
        ))
        .await
        .unwrap();
    assert!(set_cookie(&response, "refresh").unwrap().contains("Expires="));

    let (state_cookie, token) = login_form(&app).await;
    let response = app
        .clone()
        .oneshot(form_request(
            "/login",
            &format!("state={state_cookie}"),
            format!("username=admin%40admin&password=admin&state={token}"),
        ))
        .await
        .unwrap();
    assert!(!set_cookie(&response, "refresh").unwrap().contains("Expires="));
}

#[tokio::test]
async fn tampered_csrf_token_rerenders_with_fresh_state() {
    let app = app().await;
    let (state_cookie, _) = login_form(&app).await;
    let response = app
        .clone()
        .oneshot(form_request(
            "/login",
            &format!("state={state_cookie}"),
            "username=admin%40admin&password=admin&state=forged".to_string(),
        ))
        .await
        .unwrap();
    // Soft failure: the form comes back at 200 with the error and a new pair.
    assert_eq!(response.status(), StatusCode::OK);
    let fresh = cookie_value(&set_cookie(&response, "state").unwrap());
    assert_ne!(fresh, state_cookie);
    let html = body_string(response).await;
    assert!(html.contains("bad_csrf_token"));
    assert!(!hidden_state(&html).is_empty());
}

#[tokio::test]
async fn wrong_password_rerenders_form_at_ok() {
    let app = app().await;
    let (state_cookie, token) = login_form(&app).await;
    let response = app
        .clone()
        .oneshot(form_request(
            "/login",
            &format!("state={state_cookie}"),
            format!("username=admin%40admin&password=wrong&state={token}"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("invalid_grant"));
}

#[tokio::test]
async fn refresh_cookie_resumes_session_on_login_get() {
    let app = app().await;
    let (first_access, refresh, state) = sign_in(&app, true).await;

    let resume = |cookies: String| {
        let app = app.clone();
        async move {
            app.oneshot(
                Request::builder()
                    .uri("/login?origin=%2Fdashboard")
                    .header(header::COOKIE, cookies)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
        }
    };

    let response = resume(format!("refresh={refresh}; state={state}")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/dashboard?_login=1");
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
    let second_access = cookie_value(&set_cookie(&response, "access").unwrap());
    assert_ne!(second_access, first_access);
    let second_refresh = cookie_value(&set_cookie(&response, "refresh").unwrap());

    // Every resume rewrites the pair; values never repeat.
    let response = resume(format!("refresh={second_refresh}; state={state}")).await;
    let third_access = cookie_value(&set_cookie(&response, "access").unwrap());
    assert_ne!(third_access, second_access);
}

#[tokio::test]
async fn dead_refresh_cookie_renders_expired_form() {
    let app = app().await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/login")
                .header(header::COOKIE, "refresh=stale-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("session_expired"));
}

#[tokio::test]
async fn authorize_issues_code_for_cookie_session() {
    let app = app().await;
    let (access, _, _) = sign_in(&app, false).await;

    let uri = format!(
        "/oauth/authorize?response_type=code&client_id={DEMO_CLIENT_ID}\
         &redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcallback&state=xyz"
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(&uri)
                .header(header::COOKIE, format!("access={access}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let target = location(&response);
    assert!(target.starts_with(DEMO_REDIRECT_URI));
    assert!(target.contains("state=xyz"));

    let re = Regex::new(r"code=([^&]+)").unwrap();
    let code = re.captures(&target).map(|caps| caps[1].to_string()).unwrap();
    assert!(code.len() >= 20);
}

#[tokio::test]
async fn authorize_without_session_redirects_to_login() {
    let app = app().await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/oauth/authorize?response_type=code&client_id=demo-app")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let target = location(&response);
    assert!(target.starts_with("/login?origin="));
    assert!(target.contains("authorize"));
}

#[tokio::test]
async fn authorize_logout_forwards_to_confirmation() {
    let app = app().await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/oauth/authorize?response_type=logout&redirect_uri=%2Fbye")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login/logout?redirect_uri=%2Fbye");
}

#[tokio::test]
async fn stale_session_loops_back_to_login_once() {
    let app = app().await;
    // No marker: a dead bearer goes back through login.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/oauth/authorize?response_type=code&client_id=demo-app")
                .header(header::COOKIE, "access=dead-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(location(&response).starts_with("/login?origin="));

    // With the marker the loop breaks into an error redirect instead.
    let uri = format!(
        "/oauth/authorize?response_type=code&client_id={DEMO_CLIENT_ID}\
         &redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcallback&_login=1"
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(&uri)
                .header(header::COOKIE, "access=dead-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let target = location(&response);
    assert!(target.starts_with(DEMO_REDIRECT_URI));
    assert!(target.contains("error=invalid_token"));
}

#[tokio::test]
async fn logout_confirmation_requires_session() {
    let app = app().await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/login/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn logout_revokes_and_clears_cookies() {
    let app = app().await;
    let (_, refresh, state) = sign_in(&app, true).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/login/logout")
                .header(header::COOKIE, format!("refresh={refresh}; state={state}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains(r#"name="response_type" value="logout""#));
    let token = hidden_state(&html);

    let response = app
        .clone()
        .oneshot(form_request(
            "/login/logout",
            &format!("refresh={refresh}; state={state}"),
            format!("state={token}&response_type=logout"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/");
    assert!(set_cookie(&response, "access").unwrap().contains("Max-Age=0"));
    assert!(set_cookie(&response, "refresh").unwrap().contains("Max-Age=0"));

    // The refresh token no longer resumes a session.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/login")
                .header(header::COOKIE, format!("refresh={refresh}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("session_expired"));
}

#[tokio::test]
async fn logout_with_forged_token_keeps_session() {
    let app = app().await;
    let (_, refresh, state) = sign_in(&app, true).await;

    let response = app
        .clone()
        .oneshot(form_request(
            "/login/logout",
            &format!("refresh={refresh}; state={state}"),
            "state=forged".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("bad_csrf_token"));

    // The session still resumes.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/login")
                .header(header::COOKIE, format!("refresh={refresh}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
}
