//! Password strength rules, reuse history and breach lookup.

use async_trait::async_trait;
use sha1::{Digest, Sha1};
use std::time::Duration;

use crate::utils::password::{verify_password, Password};

pub const MIN_LENGTH: usize = 12;
pub const MIN_ENTROPY_BITS: f64 = 30.0;
pub const HISTORY_DEPTH: i64 = 5;
pub const PWNED_PASSWORDS_URL: &str = "https://api.pwnedpasswords.com";

const COMMON_PASSWORDS: &[&str] = &[
    "password", "123456", "12345678", "1234", "qwerty", "12345", "dragon", "baseball",
    "football", "letmein", "monkey", "abc123", "mustang", "michael", "shadow", "master",
    "jennifer", "111111", "2000", "jordan", "superman", "harley", "1234567", "freedom",
    "whatever", "trustno1", "sunshine", "iloveyou", "starwars", "bailey", "hello", "azerty",
    "654321", "password1", "admin", "welcome", "login", "passw0rd", "hello123", "696969",
    "batman", "spiderman", "ironman", "password123", "qwerty123", "welcome1", "admin123",
    "p@ssw0rd", "p@ssword123!", "password123!", "welcome123!", "changeme", "letmein123",
];

/// Entropy estimate from the character classes present and the length.
pub fn entropy_bits(password: &str) -> f64 {
    if password.is_empty() {
        return 0.0;
    }
    let classes = [
        password.chars().any(|c| c.is_ascii_lowercase()),
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| !c.is_ascii_alphanumeric()),
    ]
    .iter()
    .filter(|present| **present)
    .count();
    let pool: f64 = match classes {
        1 => 26.0,
        2 => 52.0,
        3 => 62.0,
        _ => 94.0,
    };
    password.chars().count() as f64 * pool.log2()
}

pub fn is_common(password: &str) -> bool {
    let lower = password.to_lowercase();
    COMMON_PASSWORDS.iter().any(|p| *p == lower)
}

/// Checks that need no I/O. Returns every failed rule.
pub fn check_strength(password: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if password.chars().count() < MIN_LENGTH {
        problems.push(format!("Password must be at least {} characters", MIN_LENGTH));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        problems.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        problems.push("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("Password must contain at least one number".to_string());
    }
    if !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        problems.push("Password must contain at least one special character".to_string());
    }
    if entropy_bits(password) < MIN_ENTROPY_BITS {
        problems.push("Password does not meet minimum entropy requirements".to_string());
    }
    if is_common(password) {
        problems.push("Password is too common and easily guessable".to_string());
    }
    problems
}

/// True if the password matches any of the given previous hashes.
pub fn reused(password: &Password, previous_hashes: &[String]) -> bool {
    previous_hashes.iter().any(|h| verify_password(password, h))
}

/// Known-breach lookup. Implementations fail open.
#[async_trait]
pub trait BreachChecker: Send + Sync {
    async fn is_breached(&self, password: &Password) -> bool;
}

/// k-anonymity range query against the Pwned Passwords API.
pub struct PwnedPasswordsChecker {
    client: reqwest::Client,
    base_url: String,
}

impl PwnedPasswordsChecker {
    pub fn new(base_url: impl Into<String>) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

/// Uppercase SHA-1 hex split into the 5-char prefix and the suffix.
fn range_key(password: &str) -> (String, String) {
    let digest = hex::encode_upper(Sha1::digest(password.as_bytes()));
    let (prefix, suffix) = digest.split_at(5);
    (prefix.to_string(), suffix.to_string())
}

fn suffix_listed(body: &str, suffix: &str) -> bool {
    body.lines().any(|line| {
        let mut parts = line.trim().split(':');
        let listed = parts.next().unwrap_or_default();
        let count = parts.next().and_then(|c| c.trim().parse::<u64>().ok()).unwrap_or(1);
        // Padding rows carry a zero count
        listed.eq_ignore_ascii_case(suffix) && count > 0
    })
}

#[async_trait]
impl BreachChecker for PwnedPasswordsChecker {
    async fn is_breached(&self, password: &Password) -> bool {
        let (prefix, suffix) = range_key(password.as_str());
        let url = format!("{}/range/{}", self.base_url.trim_end_matches('/'), prefix);
        let response = match self
            .client
            .get(&url)
            .header("Add-Padding", "true")
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!(status = %r.status(), "Breach check unavailable, skipping");
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Breach check failed, skipping");
                return false;
            }
        };
        match response.text().await {
            Ok(body) => suffix_listed(&body, &suffix),
            Err(e) => {
                tracing::warn!(error = %e, "Breach check body unreadable, skipping");
                false
            }
        }
    }
}

/// Used when breach checking is switched off, and in tests.
pub struct NoBreachCheck;

#[async_trait]
impl BreachChecker for NoBreachCheck {
    async fn is_breached(&self, _password: &Password) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::password::hash_password;

    #[test]
    fn strong_password_passes() {
        assert!(check_strength("Tr0ub4dor&3-Horse").is_empty());
    }

    #[test]
    fn each_rule_reports() {
        let problems = check_strength("short");
        assert!(problems.iter().any(|p| p.contains("12 characters")));
        assert!(problems.iter().any(|p| p.contains("uppercase")));
        assert!(problems.iter().any(|p| p.contains("number")));
        assert!(problems.iter().any(|p| p.contains("special")));

        let problems = check_strength("alllowercaseletters");
        assert!(problems.iter().any(|p| p.contains("uppercase")));
        assert!(!problems.iter().any(|p| p.contains("lowercase")));
    }

    #[test]
    fn common_list_is_case_insensitive() {
        assert!(is_common("PassWord123!"));
        assert!(check_strength("P@ssword123!").iter().any(|p| p.contains("common")));
    }

    #[test]
    fn entropy_grows_with_classes() {
        assert_eq!(entropy_bits(""), 0.0);
        assert!(entropy_bits("abcdef") < MIN_ENTROPY_BITS);
        assert!(entropy_bits("aB3$aB3$") > entropy_bits("abcdefgh"));
    }

    #[test]
    fn history_match_detects_reuse() {
        let old = Password::new("Old-Passw0rd-Value".to_string());
        let hashes = vec![hash_password(&old).unwrap().into_string()];
        assert!(reused(&old, &hashes));
        assert!(!reused(&Password::new("Brand-New-Passw0rd".to_string()), &hashes));
    }

    #[test]
    fn range_key_matches_known_digest() {
        // SHA-1("password") = 5BAA61E4C9B93F3F0682250B6CF8331B7EE68FD8
        let (prefix, suffix) = range_key("password");
        assert_eq!(prefix, "5BAA6");
        assert_eq!(suffix, "1E4C9B93F3F0682250B6CF8331B7EE68FD8");
    }

    #[test]
    fn padded_rows_are_ignored() {
        let body = "1E4C9B93F3F0682250B6CF8331B7EE68FD8:0\r\nAAAA:3\r\n";
        assert!(!suffix_listed(body, "1E4C9B93F3F0682250B6CF8331B7EE68FD8"));
        let body = "1e4c9b93f3f0682250b6cf8331b7ee68fd8:3730471\r\n";
        assert!(suffix_listed(body, "1E4C9B93F3F0682250B6CF8331B7EE68FD8"));
    }

    #[tokio::test]
    async fn unreachable_api_fails_open() {
        let checker = PwnedPasswordsChecker::new("http://127.0.0.1:9").unwrap();
        let password = Password::new("Tr0ub4dor&3-Horse".to_string());
        assert!(!checker.is_breached(&password).await);
    }
}
