//! Auth handlers and supporting modules.
//!
//! This module hosts the browser-facing authentication front-end: the login
//! and logout pipelines, the authorize/token OAuth2 endpoints, and the
//! pieces they share.
//!
//! ## Cookies
//!
//! Three cookies carry the session, each scoped to the narrowest path that
//! needs it:
//!
//! - **`access`** on the oauth path, expiring with its token.
//! - **`refresh`** on the login path, persistent only when remembered.
//! - **`state`** on the login path, holding the CSRF session secret.
//!
//! ## CSRF
//!
//! Forms use a double-submit scheme: the `state` cookie carries a signed
//! session secret, each rendered form a token derived from it. Both must
//! verify on POST, and the secret rotates after every successful or
//! rejected use.

mod chain;
pub(crate) mod cookies;
mod csrf;
mod error;
pub(crate) mod login;
pub(crate) mod logout;
pub(crate) mod oauth;
mod render;
pub(crate) mod session;
pub(crate) mod signed_token;
mod state;

pub use error::{AuthError, ErrorKind};
pub use state::{AuthConfig, AuthState};

#[cfg(test)]
mod tests;
