//! Route handlers for pordego.
//!
//! The auth module holds the browser-facing pipelines and OAuth2 endpoints;
//! health is the undecorated service probe.

pub mod auth;
pub mod health;
