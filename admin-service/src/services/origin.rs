//! Same-origin enforcement for state-changing requests.

use axum::http::{header, HeaderMap};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OriginError {
    #[error("no Origin or Referer header")]
    Missing,
    #[error("origin {0} does not match")]
    Mismatch(String),
    #[error("expected origin could not be determined")]
    Unknown,
}

fn normalize(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_lowercase()
}

/// Origin the request claims to target, from the canonical setting or the
/// forwarded protocol and host.
pub fn expected_origin(canonical: Option<&str>, headers: &HeaderMap) -> Option<String> {
    if let Some(origin) = canonical {
        return Some(normalize(origin));
    }
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())?;
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    Some(normalize(&format!("{}://{}", proto, host)))
}

/// Origin header must equal the expected origin; without one, the Referer
/// must start with it.
pub fn check_same_origin(canonical: Option<&str>, headers: &HeaderMap) -> Result<(), OriginError> {
    let expected = expected_origin(canonical, headers).ok_or(OriginError::Unknown)?;

    if let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        let origin = normalize(origin);
        return if origin == expected {
            Ok(())
        } else {
            Err(OriginError::Mismatch(origin))
        };
    }

    if let Some(referer) = headers.get(header::REFERER).and_then(|v| v.to_str().ok()) {
        let referer = referer.trim().to_lowercase();
        // Prefix must end at a path boundary so example.com.evil.net fails
        let matches = referer == expected
            || referer
                .strip_prefix(&expected)
                .map(|rest| rest.starts_with('/') || rest.starts_with('?'))
                .unwrap_or(false);
        return if matches {
            Ok(())
        } else {
            Err(OriginError::Mismatch(referer))
        };
    }

    Err(OriginError::Missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    const CANONICAL: Option<&str> = Some("https://Portal.Example.com/");

    #[test]
    fn matching_origin_passes_after_normalization() {
        let h = headers(&[("origin", "https://portal.example.com")]);
        assert_eq!(check_same_origin(CANONICAL, &h), Ok(()));
    }

    #[test]
    fn foreign_origin_fails_even_with_good_referer() {
        let h = headers(&[
            ("origin", "https://evil.example.net"),
            ("referer", "https://portal.example.com/admin"),
        ]);
        assert!(matches!(
            check_same_origin(CANONICAL, &h),
            Err(OriginError::Mismatch(_))
        ));
    }

    #[test]
    fn referer_prefix_is_accepted_without_origin() {
        let h = headers(&[("referer", "https://portal.example.com/admin/users?page=2")]);
        assert_eq!(check_same_origin(CANONICAL, &h), Ok(()));

        let h = headers(&[("referer", "https://portal.example.com.evil.net/admin")]);
        assert!(check_same_origin(CANONICAL, &h).is_err());
    }

    #[test]
    fn missing_both_headers_is_rejected() {
        assert_eq!(
            check_same_origin(CANONICAL, &HeaderMap::new()),
            Err(OriginError::Missing)
        );
    }

    #[test]
    fn falls_back_to_forwarded_host() {
        let h = headers(&[
            ("host", "internal:8080"),
            ("x-forwarded-host", "portal.example.com"),
            ("x-forwarded-proto", "https"),
            ("origin", "https://portal.example.com"),
        ]);
        assert_eq!(check_same_origin(None, &h), Ok(()));
    }
}
