//! Double-submit CSRF guard.
//!
//! One secret per browser session, carried in the `state` cookie; many cheap
//! derived tokens, one per rendered form. The secret is itself a signed
//! token bound to the configured master secret, so it is self-verifying and
//! needs no server-side storage. The secret never appears in a response
//! body; only derived tokens do.

use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};

use super::signed_token;

/// Session secret plus whether it was minted on this request (and therefore
/// still has to be set as a cookie).
#[derive(Clone, Debug)]
pub(crate) struct CsrfSecret {
    pub(crate) value: String,
    pub(crate) fresh: bool,
}

pub(crate) struct CsrfGuard {
    master: SecretString,
}

impl CsrfGuard {
    pub(crate) const fn new(master: SecretString) -> Self {
        Self { master }
    }

    /// Reuse a presented secret when it still verifies, mint a new one
    /// otherwise.
    pub(crate) fn ensure_secret(&self, presented: Option<&str>) -> Result<CsrfSecret> {
        if let Some(value) =
            presented.and_then(|secret| signed_token::validate(self.master.expose_secret(), secret))
        {
            return Ok(CsrfSecret {
                value,
                fresh: false,
            });
        }
        Ok(CsrfSecret {
            value: signed_token::generate(self.master.expose_secret())?,
            fresh: true,
        })
    }

    /// Mint a fresh secret unconditionally (rotate-after-use policy).
    pub(crate) fn rotate(&self) -> Result<CsrfSecret> {
        Ok(CsrfSecret {
            value: signed_token::generate(self.master.expose_secret())?,
            fresh: true,
        })
    }

    /// Mint a per-render token derived from the session secret.
    pub(crate) fn mint_token(&self, secret: &CsrfSecret) -> Result<String> {
        signed_token::generate(&secret.value)
    }

    /// Verify a double-submitted pair: the secret must verify against the
    /// master and the token against the secret.
    pub(crate) fn verify(&self, secret: Option<&str>, token: Option<&str>) -> bool {
        let (Some(secret), Some(token)) = (secret, token) else {
            return false;
        };
        signed_token::validate(self.master.expose_secret(), secret).is_some()
            && signed_token::validate(secret, token).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> CsrfGuard {
        CsrfGuard::new(SecretString::from("csrf-master".to_string()))
    }

    #[test]
    fn one_secret_many_tokens() {
        let guard = guard();
        let secret = guard.ensure_secret(None).unwrap();
        assert!(secret.fresh);
        let a = guard.mint_token(&secret).unwrap();
        let b = guard.mint_token(&secret).unwrap();
        assert_ne!(a, b);
        assert!(guard.verify(Some(&secret.value), Some(&a)));
        assert!(guard.verify(Some(&secret.value), Some(&b)));
    }

    #[test]
    fn valid_secret_is_reused() {
        let guard = guard();
        let first = guard.ensure_secret(None).unwrap();
        let second = guard.ensure_secret(Some(&first.value)).unwrap();
        assert!(!second.fresh);
        assert_eq!(first.value, second.value);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let guard = guard();
        let a = guard.ensure_secret(None).unwrap();
        let b = guard.rotate().unwrap();
        let token = guard.mint_token(&a).unwrap();
        assert!(!guard.verify(Some(&b.value), Some(&token)));
    }

    #[test]
    fn missing_or_forged_parts_are_rejected() {
        let guard = guard();
        let secret = guard.ensure_secret(None).unwrap();
        let token = guard.mint_token(&secret).unwrap();
        assert!(!guard.verify(None, Some(&token)));
        assert!(!guard.verify(Some(&secret.value), None));
        assert!(!guard.verify(Some("not-a-secret"), Some(&token)));
        assert!(!guard.verify(Some(&secret.value), Some("not-a-token")));
    }

    #[test]
    fn rotate_always_changes_the_secret() {
        let guard = guard();
        let first = guard.rotate().unwrap();
        let second = guard.rotate().unwrap();
        assert!(second.fresh);
        assert_ne!(first.value, second.value);
    }

    #[test]
    fn secret_from_other_master_is_rejected() {
        let a = guard();
        let b = CsrfGuard::new(SecretString::from("other-master".to_string()));
        let secret = a.ensure_secret(None).unwrap();
        let reissued = b.ensure_secret(Some(&secret.value)).unwrap();
        assert!(reissued.fresh, "foreign secret must be replaced");
    }
}
