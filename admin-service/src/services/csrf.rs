//! Double-submit CSRF tokens.
//!
//! A token is `hex(random) "." hex(HMAC-SHA256(secret, random))`. It is set in
//! an httpOnly cookie and must be echoed in the `x-csrf-token` header on every
//! state-changing request.

use axum::http::Method;
use secrecy::{ExposeSecret, Secret};
use service_core::utils::signature;
use thiserror::Error;

pub const CSRF_COOKIE: &str = "csrf-token";
pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_TTL_SECONDS: i64 = 24 * 60 * 60;

const RANDOM_BYTES: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CsrfError {
    #[error("CSRF cookie missing")]
    MissingCookie,
    #[error("CSRF header missing")]
    MissingHeader,
    #[error("CSRF cookie and header differ")]
    Mismatch,
    #[error("CSRF token signature invalid")]
    BadSignature,
}

/// Whether a method changes state and therefore needs a token.
pub fn requires_token(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

pub struct CsrfGuard {
    secret: Secret<String>,
}

impl CsrfGuard {
    pub fn new(secret: Secret<String>) -> Self {
        Self { secret }
    }

    pub fn issue(&self) -> Result<String, anyhow::Error> {
        let random = signature::random_hex(RANDOM_BYTES);
        let sig = signature::sign(self.secret.expose_secret().as_bytes(), random.as_bytes())?;
        Ok(format!("{}.{}", random, sig))
    }

    /// A token is well formed when its signature re-derives from its random
    /// half under the current secret.
    pub fn is_well_formed(&self, token: &str) -> bool {
        let Some((random, sig)) = token.split_once('.') else {
            return false;
        };
        if random.len() != RANDOM_BYTES * 2 {
            return false;
        }
        signature::verify(self.secret.expose_secret().as_bytes(), random.as_bytes(), sig)
            .unwrap_or(false)
    }

    pub fn verify(&self, cookie: Option<&str>, header: Option<&str>) -> Result<(), CsrfError> {
        let cookie = cookie.filter(|c| !c.is_empty()).ok_or(CsrfError::MissingCookie)?;
        let header = header.filter(|h| !h.is_empty()).ok_or(CsrfError::MissingHeader)?;
        if !signature::constant_time_eq(cookie.as_bytes(), header.as_bytes()) {
            return Err(CsrfError::Mismatch);
        }
        if !self.is_well_formed(cookie) {
            return Err(CsrfError::BadSignature);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> CsrfGuard {
        CsrfGuard::new(Secret::new("unit-test-csrf-secret".to_string()))
    }

    #[test]
    fn issued_pair_verifies() {
        let guard = guard();
        for _ in 0..20 {
            let token = guard.issue().unwrap();
            assert_eq!(guard.verify(Some(&token), Some(&token)), Ok(()));
        }
    }

    #[test]
    fn mutating_either_side_fails() {
        let guard = guard();
        let token = guard.issue().unwrap();
        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });

        assert_eq!(guard.verify(Some(&tampered), Some(&token)), Err(CsrfError::Mismatch));
        assert_eq!(guard.verify(Some(&token), Some(&tampered)), Err(CsrfError::Mismatch));
        assert_eq!(
            guard.verify(Some(&tampered), Some(&tampered)),
            Err(CsrfError::BadSignature)
        );
    }

    #[test]
    fn missing_parts_fail() {
        let guard = guard();
        let token = guard.issue().unwrap();
        assert_eq!(guard.verify(None, Some(&token)), Err(CsrfError::MissingCookie));
        assert_eq!(guard.verify(Some(&token), None), Err(CsrfError::MissingHeader));
        assert_eq!(guard.verify(Some(""), Some(&token)), Err(CsrfError::MissingCookie));
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let other = CsrfGuard::new(Secret::new("another-secret-value".to_string()));
        let token = other.issue().unwrap();
        assert_eq!(
            guard().verify(Some(&token), Some(&token)),
            Err(CsrfError::BadSignature)
        );
    }

    #[test]
    fn only_mutating_methods_need_tokens() {
        assert!(requires_token(&Method::POST));
        assert!(requires_token(&Method::DELETE));
        assert!(!requires_token(&Method::GET));
        assert!(!requires_token(&Method::HEAD));
        assert!(!requires_token(&Method::OPTIONS));
    }
}
