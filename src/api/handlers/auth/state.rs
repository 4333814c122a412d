//! Auth configuration and shared request state.

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use super::csrf::CsrfGuard;
use crate::grant::GrantBackend;
use crate::model::Model;

const DEFAULT_LOGIN_PATH: &str = "/login";
const DEFAULT_OAUTH_PATH: &str = "/oauth";
const DEFAULT_LOGIN_SUCCESS_PATH: &str = "/";
const DEFAULT_LOGOUT_CONCURRENCY: usize = 5;
const DEFAULT_LOGOUT_TIMEOUT: Duration = Duration::from_secs(10);
// Head start for fire-and-forget logout webhooks before the redirect is sent.
const DEFAULT_LOGOUT_GRACE: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct AuthConfig {
    public_base_url: String,
    development: bool,
    login_path: String,
    oauth_path: String,
    login_success_path: String,
    login_client_id: String,
    login_client_secret: SecretString,
    csrf_secret: SecretString,
    logout_concurrency: usize,
    logout_timeout: Duration,
    logout_grace: Duration,
}

impl AuthConfig {
    #[must_use]
    pub fn new(
        public_base_url: String,
        login_client_id: String,
        login_client_secret: SecretString,
        csrf_secret: SecretString,
    ) -> Self {
        Self {
            public_base_url,
            development: false,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            oauth_path: DEFAULT_OAUTH_PATH.to_string(),
            login_success_path: DEFAULT_LOGIN_SUCCESS_PATH.to_string(),
            login_client_id,
            login_client_secret,
            csrf_secret,
            logout_concurrency: DEFAULT_LOGOUT_CONCURRENCY,
            logout_timeout: DEFAULT_LOGOUT_TIMEOUT,
            logout_grace: DEFAULT_LOGOUT_GRACE,
        }
    }

    #[must_use]
    pub fn with_development(mut self, development: bool) -> Self {
        self.development = development;
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: String) -> Self {
        self.login_path = path;
        self
    }

    #[must_use]
    pub fn with_oauth_path(mut self, path: String) -> Self {
        self.oauth_path = path;
        self
    }

    #[must_use]
    pub fn with_login_success_path(mut self, path: String) -> Self {
        self.login_success_path = path;
        self
    }

    #[must_use]
    pub fn with_logout_concurrency(mut self, concurrency: usize) -> Self {
        self.logout_concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_logout_grace(mut self, grace: Duration) -> Self {
        self.logout_grace = grace;
        self
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn oauth_path(&self) -> &str {
        &self.oauth_path
    }

    #[must_use]
    pub fn logout_path(&self) -> String {
        format!("{}/logout", self.login_path)
    }

    #[must_use]
    pub fn authorize_path(&self) -> String {
        format!("{}/authorize", self.oauth_path)
    }

    #[must_use]
    pub fn token_path(&self) -> String {
        format!("{}/token", self.oauth_path)
    }

    #[must_use]
    pub fn login_success_path(&self) -> &str {
        &self.login_success_path
    }

    pub(crate) fn login_client_id(&self) -> &str {
        &self.login_client_id
    }

    pub(crate) fn login_client_secret(&self) -> &SecretString {
        &self.login_client_secret
    }

    /// Cookies are `Secure` whenever the site is served confidentially or the
    /// environment is not explicitly development.
    pub(crate) fn secure_cookies(&self) -> bool {
        self.public_base_url.starts_with("https://") || !self.development
    }

    pub(crate) fn logout_concurrency(&self) -> usize {
        self.logout_concurrency
    }

    pub(crate) fn logout_timeout(&self) -> Duration {
        self.logout_timeout
    }

    pub(crate) fn logout_grace(&self) -> Duration {
        self.logout_grace
    }
}

pub struct AuthState {
    config: AuthConfig,
    model: Arc<dyn Model>,
    grant: Arc<dyn GrantBackend>,
    csrf: CsrfGuard,
    http: reqwest::Client,
}

impl AuthState {
    /// Build the shared state, including the outbound HTTP client used for
    /// logout webhooks.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        config: AuthConfig,
        model: Arc<dyn Model>,
        grant: Arc<dyn GrantBackend>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .context("failed to build outbound HTTP client")?;
        let csrf = CsrfGuard::new(config.csrf_secret.clone());
        Ok(Self {
            config,
            model,
            grant,
            csrf,
            http,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    pub(crate) fn grant(&self) -> &dyn GrantBackend {
        self.grant.as_ref()
    }

    pub(crate) fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }
}
