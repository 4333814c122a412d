//! Contract required from the persistence/grant store.
//!
//! The front-end never talks to a database directly; everything it needs is
//! behind the [`Model`] trait. Real deployments implement it on top of their
//! own store, [`MemoryModel`] is the built-in implementation used for
//! development and tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

mod memory;

pub use memory::MemoryModel;

/// Registered OAuth2 client.
///
/// Clients without a `logout_uri` are silently skipped during logout fan-out.
#[derive(Clone, Debug)]
pub struct ClientRecord {
    pub client_id: String,
    pub redirect_uris: Vec<String>,
    pub grants: Vec<String>,
    pub logout_uri: Option<String>,
}

/// Resolved end-user.
///
/// `logout_token` is minted anew at each successful sign-in and is the only
/// value handed to relying-party clients during logout notification; it never
/// reveals the access or refresh token.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub scope: Option<String>,
    pub remember: bool,
    pub logout_token: String,
}

/// Token pair returned by a successful exchange.
#[derive(Clone, Debug)]
pub struct GrantedToken {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token: Option<String>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub client_id: String,
    pub user: UserRecord,
}

/// What a stored access or refresh token resolves to.
#[derive(Clone, Debug)]
pub struct TokenBinding {
    pub user: UserRecord,
    pub client_id: String,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Single-use authorization code bound to a client redirect.
#[derive(Clone, Debug)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub user: UserRecord,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Client to notify on logout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogoutClient {
    pub client_id: String,
    pub logout_uri: String,
}

/// Narrow persistence contract (behavioral, not literal SQL).
///
/// Implementations must treat duplicate access-token insertion as an error,
/// never accept it silently; the front-end relies on token uniqueness.
#[async_trait]
pub trait Model: Send + Sync {
    /// Resolve a client, verifying the secret when one is supplied.
    async fn get_client(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<Option<ClientRecord>>;

    /// Resolve a user by credentials. `None` on unknown user or bad password.
    async fn get_user(&self, username: &str, password: &str) -> Result<Option<UserRecord>>;

    async fn get_access_token(&self, token: &str) -> Result<Option<TokenBinding>>;

    async fn get_refresh_token(&self, token: &str) -> Result<Option<TokenBinding>>;

    /// Persist a freshly minted token pair. Must reject duplicates.
    async fn save_token(&self, token: &GrantedToken) -> Result<()>;

    async fn save_authorization_code(&self, code: &AuthorizationCode) -> Result<()>;

    /// Fetch and delete an authorization code in one step (single use).
    async fn take_authorization_code(&self, code: &str) -> Result<Option<AuthorizationCode>>;

    /// Revoke every authorization code, access, and refresh token of the user
    /// the given token resolves to. Returns the user, or `None` when neither
    /// token resolves.
    async fn revoke_all_tokens(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<Option<UserRecord>>;

    /// Distinct clients with a non-empty `logout_uri` that ever issued the
    /// user a token.
    async fn logout_clients(&self, user: &UserRecord) -> Result<Vec<LogoutClient>>;

    /// Stamp a successful sign-in; also rotates the user's logout token.
    async fn last_sign_in_at(&self, user: &UserRecord, remember: bool) -> Result<()>;

    /// Stamp a sign-out.
    async fn last_sign_out_at(&self, user: &UserRecord) -> Result<()>;
}
