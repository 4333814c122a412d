//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the
//! appropriate action, such as starting the front-end with its full
//! configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::front;
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);

    let front_opts = front::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        public_url: front_opts.public_url,
        login_path: front_opts.login_path,
        oauth_path: front_opts.oauth_path,
        login_success_path: front_opts.login_success_path,
        login_client_id: front_opts.login_client_id,
        login_client_secret: front_opts.login_client_secret,
        csrf_secret: front_opts.csrf_secret,
        token_secret: front_opts.token_secret,
        logout_concurrency: front_opts.logout_concurrency,
        logout_timeout_seconds: front_opts.logout_timeout_seconds,
        logout_grace_ms: front_opts.logout_grace_ms,
        development: front_opts.development,
        demo: front_opts.demo,
    }))
}
