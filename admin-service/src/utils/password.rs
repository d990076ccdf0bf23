use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use zeroize::Zeroizing;

/// Plaintext password. Wiped on drop and never printed.
#[derive(Clone)]
pub struct Password(Zeroizing<String>);

impl Password {
    pub fn new(password: String) -> Self {
        Self(Zeroizing::new(password))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Argon2id hash with a fresh salt embedded in the PHC string.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(PasswordHashString::new(hash))
}

/// `false` for a wrong password and for an unparseable stored hash.
pub fn verify_password(password: &Password, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_str().as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is malformed");
            false
        }
    }
}

/// Hash of a fixed throwaway password, verified against when the account
/// does not exist so both paths cost one Argon2 run.
pub fn dummy_verify(password: &Password) {
    static DUMMY: once_cell::sync::Lazy<Option<String>> = once_cell::sync::Lazy::new(|| {
        hash_password(&Password::new("dummy-password-for-timing".to_string()))
            .ok()
            .map(PasswordHashString::into_string)
    });
    if let Some(hash) = DUMMY.as_deref() {
        let _ = verify_password(password, hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        let hash = hash_password(&Password::new("Correct-Horse-42!".to_string())).unwrap();
        assert!(hash.as_str().starts_with("$argon2"));
    }

    #[test]
    fn test_verify_password() {
        let password = Password::new("Correct-Horse-42!".to_string());
        let hash = hash_password(&password).unwrap();
        assert!(verify_password(&password, hash.as_str()));
        assert!(!verify_password(&Password::new("wrong".to_string()), hash.as_str()));
        assert!(!verify_password(&password, "not-a-phc-string"));
    }

    #[test]
    fn test_salts_differ() {
        let password = Password::new("Correct-Horse-42!".to_string());
        let a = hash_password(&password).unwrap();
        let b = hash_password(&password).unwrap();
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_debug_hides_plaintext() {
        let password = Password::new("Correct-Horse-42!".to_string());
        assert!(!format!("{:?}", password).contains("Horse"));
    }
}
