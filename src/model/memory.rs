//! In-memory [`Model`] implementation for development and tests.
//!
//! The store is an explicit value passed in at construction, created at
//! process start and dropped on shutdown. Raw token values never touch the
//! store; only SHA-256 hashes are kept for lookups.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    AuthorizationCode, ClientRecord, GrantedToken, LogoutClient, Model, TokenBinding, UserRecord,
};

struct StoredClient {
    record: ClientRecord,
    secret_hash: Vec<u8>,
}

struct StoredUser {
    record: UserRecord,
    password_hash: Vec<u8>,
    last_sign_in_at: Option<DateTime<Utc>>,
    last_sign_out_at: Option<DateTime<Utc>>,
}

struct StoredToken {
    username: String,
    client_id: String,
    scope: Option<String>,
    expires_at: DateTime<Utc>,
}

struct StoredCode {
    code: AuthorizationCode,
}

#[derive(Default)]
struct Inner {
    clients: HashMap<String, StoredClient>,
    users: HashMap<String, StoredUser>,
    access_tokens: HashMap<Vec<u8>, StoredToken>,
    refresh_tokens: HashMap<Vec<u8>, StoredToken>,
    codes: HashMap<Vec<u8>, StoredCode>,
    // Issuance history survives revocation so logout fan-out can still
    // discover which clients ever held a token for the user.
    issued: HashMap<String, BTreeSet<String>>,
}

pub struct MemoryModel {
    inner: Mutex<Inner>,
}

fn hash_value(value: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().to_vec()
}

fn random_token() -> Result<String> {
    let mut bytes = [0u8; 24];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate random token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

impl MemoryModel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register a client with its plain secret (hashed before storage).
    pub async fn add_client(&self, record: ClientRecord, secret: &str) {
        let mut inner = self.inner.lock().await;
        inner.clients.insert(
            record.client_id.clone(),
            StoredClient {
                record,
                secret_hash: hash_value(secret),
            },
        );
    }

    /// Register a user with its plain password (hashed before storage).
    ///
    /// # Errors
    /// Returns an error if the initial logout token cannot be generated.
    pub async fn add_user(&self, username: &str, password: &str, scope: Option<&str>) -> Result<()> {
        let record = UserRecord {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            scope: scope.map(ToString::to_string),
            remember: false,
            logout_token: random_token()?,
        };
        let mut inner = self.inner.lock().await;
        inner.users.insert(
            username.to_string(),
            StoredUser {
                record,
                password_hash: hash_value(password),
                last_sign_in_at: None,
                last_sign_out_at: None,
            },
        );
        Ok(())
    }

    /// Last sign-out timestamp, exposed for tests and diagnostics.
    pub async fn last_sign_out(&self, username: &str) -> Option<DateTime<Utc>> {
        let inner = self.inner.lock().await;
        inner
            .users
            .get(username)
            .and_then(|user| user.last_sign_out_at)
    }
}

impl Default for MemoryModel {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn binding(&self, stored: &StoredToken) -> Option<TokenBinding> {
        let user = self.users.get(&stored.username)?;
        Some(TokenBinding {
            user: user.record.clone(),
            client_id: stored.client_id.clone(),
            scope: stored.scope.clone(),
            expires_at: stored.expires_at,
        })
    }
}

#[async_trait]
impl Model for MemoryModel {
    async fn get_client(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<Option<ClientRecord>> {
        let inner = self.inner.lock().await;
        let Some(stored) = inner.clients.get(client_id) else {
            return Ok(None);
        };
        if let Some(secret) = client_secret {
            if hash_value(secret) != stored.secret_hash {
                return Ok(None);
            }
        }
        Ok(Some(stored.record.clone()))
    }

    async fn get_user(&self, username: &str, password: &str) -> Result<Option<UserRecord>> {
        let inner = self.inner.lock().await;
        let Some(stored) = inner.users.get(username) else {
            return Ok(None);
        };
        if hash_value(password) != stored.password_hash {
            return Ok(None);
        }
        Ok(Some(stored.record.clone()))
    }

    async fn get_access_token(&self, token: &str) -> Result<Option<TokenBinding>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .access_tokens
            .get(&hash_value(token))
            .filter(|stored| stored.expires_at > Utc::now())
            .and_then(|stored| inner.binding(stored)))
    }

    async fn get_refresh_token(&self, token: &str) -> Result<Option<TokenBinding>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .refresh_tokens
            .get(&hash_value(token))
            .filter(|stored| stored.expires_at > Utc::now())
            .and_then(|stored| inner.binding(stored)))
    }

    async fn save_token(&self, token: &GrantedToken) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let access_hash = hash_value(&token.access_token);
        if inner.access_tokens.contains_key(&access_hash) {
            return Err(anyhow!("duplicate access token"));
        }
        inner.access_tokens.insert(
            access_hash,
            StoredToken {
                username: token.user.username.clone(),
                client_id: token.client_id.clone(),
                scope: token.scope.clone(),
                expires_at: token.access_token_expires_at,
            },
        );
        if let (Some(refresh), Some(expires_at)) =
            (&token.refresh_token, token.refresh_token_expires_at)
        {
            inner.refresh_tokens.insert(
                hash_value(refresh),
                StoredToken {
                    username: token.user.username.clone(),
                    client_id: token.client_id.clone(),
                    scope: token.scope.clone(),
                    expires_at,
                },
            );
        }
        inner
            .issued
            .entry(token.user.username.clone())
            .or_default()
            .insert(token.client_id.clone());
        Ok(())
    }

    async fn save_authorization_code(&self, code: &AuthorizationCode) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .codes
            .insert(hash_value(&code.code), StoredCode { code: code.clone() });
        Ok(())
    }

    async fn take_authorization_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .codes
            .remove(&hash_value(code))
            .map(|stored| stored.code)
            .filter(|code| code.expires_at > Utc::now()))
    }

    async fn revoke_all_tokens(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<Option<UserRecord>> {
        let mut inner = self.inner.lock().await;
        let username = access_token
            .map(hash_value)
            .and_then(|hash| inner.access_tokens.get(&hash))
            .or_else(|| {
                refresh_token
                    .map(hash_value)
                    .and_then(|hash| inner.refresh_tokens.get(&hash))
            })
            .map(|stored| stored.username.clone());

        let Some(username) = username else {
            return Ok(None);
        };

        inner
            .access_tokens
            .retain(|_, stored| stored.username != username);
        inner
            .refresh_tokens
            .retain(|_, stored| stored.username != username);
        inner
            .codes
            .retain(|_, stored| stored.code.user.username != username);

        Ok(inner.users.get(&username).map(|user| user.record.clone()))
    }

    async fn logout_clients(&self, user: &UserRecord) -> Result<Vec<LogoutClient>> {
        let inner = self.inner.lock().await;
        let Some(client_ids) = inner.issued.get(&user.username) else {
            return Ok(Vec::new());
        };
        Ok(client_ids
            .iter()
            .filter_map(|client_id| inner.clients.get(client_id))
            .filter_map(|client| {
                client.record.logout_uri.as_ref().map(|uri| LogoutClient {
                    client_id: client.record.client_id.clone(),
                    logout_uri: uri.clone(),
                })
            })
            .collect())
    }

    async fn last_sign_in_at(&self, user: &UserRecord, remember: bool) -> Result<()> {
        let logout_token = random_token()?;
        let mut inner = self.inner.lock().await;
        let stored = inner
            .users
            .get_mut(&user.username)
            .ok_or_else(|| anyhow!("unknown user: {}", user.username))?;
        stored.last_sign_in_at = Some(Utc::now());
        stored.record.remember = remember;
        // A fresh logout token per sign-in keeps earlier sessions
        // uncorrelatable by relying-party clients.
        stored.record.logout_token = logout_token;
        Ok(())
    }

    async fn last_sign_out_at(&self, user: &UserRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .users
            .get_mut(&user.username)
            .ok_or_else(|| anyhow!("unknown user: {}", user.username))?;
        stored.last_sign_out_at = Some(Utc::now());
        Ok(())
    }
}
