use crate::{
    api,
    api::handlers::auth::{AuthConfig, AuthState},
    grant::ModelBackend,
    model::{ClientRecord, MemoryModel, Model},
};
use anyhow::Result;
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub public_url: String,
    pub login_path: String,
    pub oauth_path: String,
    pub login_success_path: String,
    pub login_client_id: String,
    pub login_client_secret: String,
    pub csrf_secret: String,
    pub token_secret: String,
    pub logout_concurrency: usize,
    pub logout_timeout_seconds: u64,
    pub logout_grace_ms: u64,
    pub development: bool,
    pub demo: bool,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if state construction or the server itself fails.
pub async fn execute(args: Args) -> Result<()> {
    let config = AuthConfig::new(
        args.public_url,
        args.login_client_id.clone(),
        SecretString::from(args.login_client_secret.clone()),
        SecretString::from(args.csrf_secret),
    )
    .with_development(args.development)
    .with_login_path(args.login_path)
    .with_oauth_path(args.oauth_path)
    .with_login_success_path(args.login_success_path)
    .with_logout_concurrency(args.logout_concurrency)
    .with_logout_timeout(Duration::from_secs(args.logout_timeout_seconds))
    .with_logout_grace(Duration::from_millis(args.logout_grace_ms));

    if args.development {
        warn!("development mode: cookies are sent without the Secure attribute");
    }

    let model = Arc::new(MemoryModel::new());
    model
        .add_client(
            ClientRecord {
                client_id: args.login_client_id,
                redirect_uris: vec![],
                grants: vec!["password".to_string(), "refresh_token".to_string()],
                logout_uri: None,
            },
            &args.login_client_secret,
        )
        .await;

    if args.demo {
        seed_demo(&model).await?;
    }

    let grant = ModelBackend::new(
        model.clone() as Arc<dyn Model>,
        SecretString::from(args.token_secret),
    );
    let state = AuthState::new(config, model, Arc::new(grant))?;

    api::serve(args.port, Arc::new(state)).await
}

/// Demo fixtures: one user and one relying-party client, for local runs.
async fn seed_demo(model: &Arc<MemoryModel>) -> Result<()> {
    model
        .add_user("admin@admin", "admin", Some("read write"))
        .await?;
    model
        .add_client(
            ClientRecord {
                client_id: "demo-app".to_string(),
                redirect_uris: vec!["http://localhost:3000/callback".to_string()],
                grants: vec![
                    "authorization_code".to_string(),
                    "refresh_token".to_string(),
                ],
                logout_uri: Some("http://localhost:3000/logout".to_string()),
            },
            "demo-secret",
        )
        .await;
    info!("demo fixtures loaded: user admin@admin, client demo-app");
    Ok(())
}
