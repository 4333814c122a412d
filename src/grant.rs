//! Grant backend seam.
//!
//! The front-end never validates grants itself; it hands token exchanges and
//! authorization requests to a [`GrantBackend`]. [`ModelBackend`] is the
//! built-in implementation over the [`Model`] contract, enough for the
//! password, refresh_token, and authorization_code flows the front-end
//! drives. Scope negotiation and the remaining grant types belong to a real
//! authorization server plugged in behind this trait.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use crate::api::handlers::auth::{AuthError, signed_token};
use crate::model::{AuthorizationCode, ClientRecord, GrantedToken, Model, TokenBinding};

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 14 * 24 * 60 * 60;
const DEFAULT_CODE_TTL_SECONDS: i64 = 5 * 60;

/// Normalized token-exchange request, whatever transport it arrived on.
#[derive(Clone, Debug, Default)]
pub struct TokenRequest {
    pub grant_type: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone, Debug)]
pub struct AuthorizeRequest {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
}

/// Code handed back to the relying-party redirect.
#[derive(Clone, Debug)]
pub struct IssuedCode {
    pub code: String,
    pub redirect_uri: String,
}

#[async_trait]
pub trait GrantBackend: Send + Sync {
    /// Authenticate the client and perform a token exchange.
    async fn token(&self, request: &TokenRequest) -> Result<GrantedToken, AuthError>;

    /// Authenticate the bearer and issue an authorization code.
    async fn authorize(
        &self,
        request: &AuthorizeRequest,
        bearer: &str,
    ) -> Result<IssuedCode, AuthError>;

    /// Resolve a bearer access token.
    async fn authenticate(&self, bearer: &str) -> Result<TokenBinding, AuthError>;
}

pub struct ModelBackend {
    model: Arc<dyn Model>,
    token_secret: SecretString,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    code_ttl: Duration,
}

impl ModelBackend {
    #[must_use]
    pub fn new(model: Arc<dyn Model>, token_secret: SecretString) -> Self {
        Self {
            model,
            token_secret,
            access_token_ttl: Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL_SECONDS),
            refresh_token_ttl: Duration::seconds(DEFAULT_REFRESH_TOKEN_TTL_SECONDS),
            code_ttl: Duration::seconds(DEFAULT_CODE_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl = Duration::seconds(seconds);
        self
    }

    async fn authenticated_client(&self, request: &TokenRequest) -> Result<ClientRecord, AuthError> {
        if request.client_id.is_empty() {
            return Err(AuthError::invalid_client());
        }
        self.model
            .get_client(&request.client_id, Some(&request.client_secret))
            .await?
            .ok_or_else(AuthError::invalid_client)
    }

    fn mint(&self) -> Result<String, AuthError> {
        Ok(signed_token::generate(self.token_secret.expose_secret())?)
    }

    async fn issue(
        &self,
        client: &ClientRecord,
        binding: TokenBinding,
        with_refresh: bool,
    ) -> Result<GrantedToken, AuthError> {
        let now = Utc::now();
        let refresh_token = if with_refresh { Some(self.mint()?) } else { None };
        let token = GrantedToken {
            access_token: self.mint()?,
            access_token_expires_at: now + self.access_token_ttl,
            refresh_token_expires_at: refresh_token.as_ref().map(|_| now + self.refresh_token_ttl),
            refresh_token,
            scope: binding.scope,
            client_id: client.client_id.clone(),
            user: binding.user,
        };
        // The store rejects duplicate access tokens; that is a hard failure,
        // not something to retry silently.
        self.model.save_token(&token).await?;
        Ok(token)
    }
}

#[async_trait]
impl GrantBackend for ModelBackend {
    async fn token(&self, request: &TokenRequest) -> Result<GrantedToken, AuthError> {
        let client = self.authenticated_client(request).await?;
        if !client.grants.iter().any(|grant| grant == &request.grant_type) {
            return Err(AuthError::unauthorized_client());
        }

        match request.grant_type.as_str() {
            "password" => {
                let (Some(username), Some(password)) =
                    (request.username.as_deref(), request.password.as_deref())
                else {
                    return Err(AuthError::invalid_request()
                        .with_status(axum::http::StatusCode::BAD_REQUEST));
                };
                let user = self
                    .model
                    .get_user(username, password)
                    .await?
                    .ok_or_else(AuthError::invalid_grant)?;
                let scope = request.scope.clone().or_else(|| user.scope.clone());
                let binding = TokenBinding {
                    user,
                    client_id: client.client_id.clone(),
                    scope,
                    expires_at: Utc::now(),
                };
                self.issue(&client, binding, true).await
            }
            "refresh_token" => {
                let Some(refresh_token) = request.refresh_token.as_deref() else {
                    return Err(AuthError::invalid_request()
                        .with_status(axum::http::StatusCode::BAD_REQUEST));
                };
                let binding = self
                    .model
                    .get_refresh_token(refresh_token)
                    .await?
                    .filter(|binding| binding.client_id == client.client_id)
                    .ok_or_else(AuthError::invalid_grant)?;
                self.issue(&client, binding, true).await
            }
            "authorization_code" => {
                let Some(code) = request.code.as_deref() else {
                    return Err(AuthError::invalid_request()
                        .with_status(axum::http::StatusCode::BAD_REQUEST));
                };
                let code = self
                    .model
                    .take_authorization_code(code)
                    .await?
                    .filter(|code| code.client_id == client.client_id)
                    .filter(|code| {
                        request
                            .redirect_uri
                            .as_deref()
                            .map_or(true, |uri| uri == code.redirect_uri)
                    })
                    .ok_or_else(AuthError::invalid_grant)?;
                let binding = TokenBinding {
                    user: code.user,
                    client_id: client.client_id.clone(),
                    scope: code.scope,
                    expires_at: Utc::now(),
                };
                self.issue(&client, binding, true).await
            }
            _ => Err(AuthError::unsupported_grant_type()),
        }
    }

    async fn authorize(
        &self,
        request: &AuthorizeRequest,
        bearer: &str,
    ) -> Result<IssuedCode, AuthError> {
        if request.response_type != "code" {
            return Err(AuthError::unsupported_response_type());
        }
        let binding = self.authenticate(bearer).await?;
        let client = self
            .model
            .get_client(&request.client_id, None)
            .await?
            .ok_or_else(AuthError::invalid_client)?;
        if !client
            .redirect_uris
            .iter()
            .any(|uri| uri == &request.redirect_uri)
        {
            return Err(AuthError::invalid_request()
                .with_status(axum::http::StatusCode::BAD_REQUEST));
        }

        let code = AuthorizationCode {
            code: self.mint()?,
            client_id: client.client_id,
            redirect_uri: request.redirect_uri.clone(),
            user: binding.user,
            scope: request.scope.clone().or(binding.scope),
            expires_at: Utc::now() + self.code_ttl,
        };
        self.model.save_authorization_code(&code).await?;
        Ok(IssuedCode {
            code: code.code,
            redirect_uri: code.redirect_uri,
        })
    }

    async fn authenticate(&self, bearer: &str) -> Result<TokenBinding, AuthError> {
        if bearer.is_empty() {
            return Err(AuthError::invalid_token());
        }
        self.model
            .get_access_token(bearer)
            .await?
            .ok_or_else(AuthError::invalid_token)
    }
}
