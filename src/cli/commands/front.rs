//! Arguments for the authentication front-end: client credentials, secrets,
//! mount paths, and logout fan-out tuning.

use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_PUBLIC_URL: &str = "public-url";
pub const ARG_LOGIN_PATH: &str = "login-path";
pub const ARG_OAUTH_PATH: &str = "oauth-path";
pub const ARG_LOGIN_SUCCESS_PATH: &str = "login-success-path";
pub const ARG_LOGIN_CLIENT_ID: &str = "login-client-id";
pub const ARG_LOGIN_CLIENT_SECRET: &str = "login-client-secret";
pub const ARG_CSRF_SECRET: &str = "csrf-secret";
pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_LOGOUT_CONCURRENCY: &str = "logout-concurrency";
pub const ARG_LOGOUT_TIMEOUT_SECONDS: &str = "logout-timeout-seconds";
pub const ARG_LOGOUT_GRACE_MS: &str = "logout-grace-ms";
pub const ARG_DEVELOPMENT: &str = "development";
pub const ARG_DEMO: &str = "demo";

#[derive(Debug, Clone)]
pub struct Options {
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

impl Options {
    /// Parse front-end arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a required secret or client credential is missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        // Filter empty strings which clap might pass through if env vars are set to ""
        let required = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };
        let with_default = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .unwrap_or_default()
        };

        Ok(Self {
            public_url: with_default(ARG_PUBLIC_URL),
            login_path: with_default(ARG_LOGIN_PATH),
            oauth_path: with_default(ARG_OAUTH_PATH),
            login_success_path: with_default(ARG_LOGIN_SUCCESS_PATH),
            login_client_id: required(ARG_LOGIN_CLIENT_ID)?,
            login_client_secret: required(ARG_LOGIN_CLIENT_SECRET)?,
            csrf_secret: required(ARG_CSRF_SECRET)?,
            token_secret: required(ARG_TOKEN_SECRET)?,
            logout_concurrency: matches
                .get_one::<usize>(ARG_LOGOUT_CONCURRENCY)
                .copied()
                .unwrap_or(5),
            logout_timeout_seconds: matches
                .get_one::<u64>(ARG_LOGOUT_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(10),
            logout_grace_ms: matches
                .get_one::<u64>(ARG_LOGOUT_GRACE_MS)
                .copied()
                .unwrap_or(100),
            development: matches.get_flag(ARG_DEVELOPMENT),
            demo: matches.get_flag(ARG_DEMO),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_mount_args(command);
    let command = with_secret_args(command);
    with_logout_args(command)
}

fn with_mount_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PUBLIC_URL)
                .long(ARG_PUBLIC_URL)
                .help("Public base URL the front-end is reachable on")
                .env("PORDEGO_PUBLIC_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_LOGIN_PATH)
                .long(ARG_LOGIN_PATH)
                .help("Mount path for the login form and refresh/state cookies")
                .env("PORDEGO_LOGIN_PATH")
                .default_value("/login"),
        )
        .arg(
            Arg::new(ARG_OAUTH_PATH)
                .long(ARG_OAUTH_PATH)
                .help("Mount path for the authorize/token endpoints and access cookie")
                .env("PORDEGO_OAUTH_PATH")
                .default_value("/oauth"),
        )
        .arg(
            Arg::new(ARG_LOGIN_SUCCESS_PATH)
                .long(ARG_LOGIN_SUCCESS_PATH)
                .help("Where to send the browser after login when no origin is given")
                .env("PORDEGO_LOGIN_SUCCESS_PATH")
                .default_value("/"),
        )
}

fn with_secret_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOGIN_CLIENT_ID)
                .long(ARG_LOGIN_CLIENT_ID)
                .help("OAuth2 client id the login form exchanges credentials under")
                .env("PORDEGO_LOGIN_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_LOGIN_CLIENT_SECRET)
                .long(ARG_LOGIN_CLIENT_SECRET)
                .help("Secret for the login client")
                .env("PORDEGO_LOGIN_CLIENT_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_CSRF_SECRET)
                .long(ARG_CSRF_SECRET)
                .help("Master secret the CSRF state cookie is signed with")
                .env("PORDEGO_CSRF_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("Secret the built-in grant backend signs tokens with")
                .env("PORDEGO_TOKEN_SECRET")
                .required(true),
        )
}

fn with_logout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOGOUT_CONCURRENCY)
                .long(ARG_LOGOUT_CONCURRENCY)
                .help("Maximum in-flight logout notifications")
                .env("PORDEGO_LOGOUT_CONCURRENCY")
                .default_value("5")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_LOGOUT_TIMEOUT_SECONDS)
                .long(ARG_LOGOUT_TIMEOUT_SECONDS)
                .help("Per-client timeout for logout notifications in seconds")
                .env("PORDEGO_LOGOUT_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_LOGOUT_GRACE_MS)
                .long(ARG_LOGOUT_GRACE_MS)
                .help("Head start given to the logout fan-out before redirecting, in milliseconds")
                .env("PORDEGO_LOGOUT_GRACE_MS")
                .default_value("100")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_DEVELOPMENT)
                .long(ARG_DEVELOPMENT)
                .help("Allow cookies without the Secure attribute on plain HTTP")
                .env("PORDEGO_DEVELOPMENT")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_DEMO)
                .long(ARG_DEMO)
                .help("Seed the in-memory model with a demo user and client")
                .action(ArgAction::SetTrue),
        )
}
