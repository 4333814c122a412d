//! Access/refresh cookie management.
//!
//! The `access` cookie mirrors the access token and is scoped to the OAuth
//! mount path; the `refresh` cookie is scoped to the login mount path and
//! stays a session cookie unless "remember me" was set at login. The cookie
//! names are part of the wire contract.

use axum::http::HeaderMap;
use chrono::DateTime;

use super::cookies::{self, CookieAttributes};
use super::error::AuthError;
use super::state::AuthConfig;
use crate::model::GrantedToken;

pub(crate) const ACCESS_COOKIE: &str = "access";
pub(crate) const REFRESH_COOKIE: &str = "refresh";
pub(crate) const STATE_COOKIE: &str = "state";

pub(crate) struct SessionCookies<'a> {
    config: &'a AuthConfig,
}

impl<'a> SessionCookies<'a> {
    pub(crate) const fn new(config: &'a AuthConfig) -> Self {
        Self { config }
    }

    /// Set the `access` and `refresh` cookies for a granted token pair.
    ///
    /// The access cookie never outlives its token. The refresh cookie only
    /// carries an expiry when the user asked to be remembered.
    pub(crate) fn set(
        &self,
        headers: &mut HeaderMap,
        token: &GrantedToken,
        remember: bool,
    ) -> Result<(), AuthError> {
        if token.access_token.is_empty() {
            return Err(AuthError::invalid_grant()
                .with_status(axum::http::StatusCode::UNAUTHORIZED));
        }
        let secure = self.config.secure_cookies();

        cookies::set(
            headers,
            ACCESS_COOKIE,
            &token.access_token,
            &CookieAttributes {
                path: self.config.oauth_path().to_string(),
                expires: Some(token.access_token_expires_at),
                max_age: None,
                http_only: true,
                secure,
            },
        );

        if let Some(refresh) = &token.refresh_token {
            let remember = token.user.remember || remember;
            cookies::set(
                headers,
                REFRESH_COOKIE,
                refresh,
                &CookieAttributes {
                    path: self.config.login_path().to_string(),
                    expires: remember
                        .then_some(token.refresh_token_expires_at)
                        .flatten(),
                    max_age: None,
                    http_only: true,
                    secure,
                },
            );
        }
        Ok(())
    }

    /// Set the CSRF secret cookie (session lifetime, login path).
    pub(crate) fn set_state(&self, headers: &mut HeaderMap, secret: &str) {
        cookies::set(
            headers,
            STATE_COOKIE,
            secret,
            &CookieAttributes {
                path: self.config.login_path().to_string(),
                expires: None,
                max_age: None,
                http_only: true,
                secure: self.config.secure_cookies(),
            },
        );
    }

    /// Delete the session cookies. The access cookie is always cleared; the
    /// refresh cookie only when one was presented, so the operation stays
    /// idempotent.
    pub(crate) fn delete(&self, headers: &mut HeaderMap, had_refresh: bool) {
        let expired = CookieAttributes {
            path: self.config.oauth_path().to_string(),
            expires: Some(DateTime::UNIX_EPOCH),
            max_age: Some(0),
            http_only: true,
            secure: false,
        };
        cookies::set(headers, ACCESS_COOKIE, "", &expired);

        if had_refresh {
            let expired = CookieAttributes {
                path: self.config.login_path().to_string(),
                ..expired
            };
            cookies::set(headers, REFRESH_COOKIE, "", &expired);
        }
    }
}
