//! HMAC-based self-verifying token codec.
//!
//! A token is `urlsafe(common ++ mac)` where `common` is 24 characters of
//! base64-encoded randomness and `mac = base64(HMAC-SHA256(secret, common))`
//! with trailing padding stripped. Validation re-derives the MAC from the
//! common part, so no server-side storage is needed. Used for CSRF secrets
//! and the per-form tokens derived from them; the dev grant backend mints
//! access/refresh tokens the same way.

use anyhow::{Context, Result};
use base64ct::{Base64, Encoding};
use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;

const COMMON_LEN: usize = 24;

type HmacSha256 = Hmac<Sha256>;

/// Mint a fresh token bound to `secret`.
///
/// # Errors
/// Returns an error if the entropy source is unavailable.
pub(crate) fn generate(secret: &str) -> Result<String> {
    let mut bytes = [0u8; COMMON_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to draw token randomness")?;
    let mut common = Base64::encode_string(&bytes);
    common.truncate(COMMON_LEN);
    sign(secret, &common)
}

/// Check `token` against `secret`. `None` on any mismatch; the caller decides
/// the HTTP-level response.
pub(crate) fn validate(secret: &str, token: &str) -> Option<String> {
    let decoded = decode_url_safe(token);
    if !decoded.is_ascii() || decoded.len() <= COMMON_LEN {
        return None;
    }
    let common = &decoded[..COMMON_LEN];
    let expected = sign(secret, common).ok()?;
    if constant_time_eq(expected.as_bytes(), token.as_bytes()) {
        Some(token.to_string())
    } else {
        None
    }
}

fn sign(secret: &str, common: &str) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).context("failed to key token mac")?;
    mac.update(common.as_bytes());
    let digest = mac.finalize().into_bytes();
    let hash = Base64::encode_string(&digest);
    Ok(encode_url_safe(&format!(
        "{common}{}",
        hash.trim_end_matches('=')
    )))
}

fn encode_url_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect()
}

fn decode_url_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
