//! # Pordego (OAuth2 Authentication Front-End)
//!
//! `pordego` sits between a relying-party login form and an OAuth2 grant
//! backend. Browsers never handle bearer tokens directly; instead the
//! front-end manages the session through three `HttpOnly` cookies:
//!
//! - `access`: mirrors the access token, scoped to the OAuth mount path.
//! - `refresh`: mirrors the refresh token, scoped to the login mount path.
//!   A session cookie unless the user checked "remember me" at login.
//! - `state`: the per-session CSRF secret, scoped to the login mount path.
//!
//! ## Flows
//!
//! A bare `GET` on the login path carrying a `refresh` cookie is rewritten
//! into a synthetic `grant_type=refresh_token` exchange, so a page load alone
//! silently renews an expired access token. Credential `POST`s run through
//! double-submit CSRF verification before the password grant. `/authorize`
//! bridges the access cookie to a bearer header; `response_type=logout` on
//! `/authorize` is intercepted and redirected to the logout path.
//!
//! ## Logout fan-out
//!
//! Logout revokes every token of the acting user, then notifies each client
//! that declared a `logout_uri` with a best-effort `POST {logoutToken}` under
//! bounded concurrency and a fixed per-request timeout, without blocking the
//! user-visible redirect.
//!
//! The grant backend and the persistence layer are external collaborators
//! reached through the [`grant::GrantBackend`] and [`model::Model`] traits.

pub mod api;
pub mod cli;
pub mod grant;
pub mod model;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
