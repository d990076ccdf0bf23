//! TOTP second factor and encryption of stored TOTP secrets.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use service_core::utils::signature::constant_time_eq;
use zeroize::Zeroizing;

pub const TOTP_DIGITS: u32 = 6;
pub const TOTP_STEP_SECONDS: i64 = 30;
pub const TOTP_SKEW_STEPS: i64 = 1;
pub const BACKUP_CODE_COUNT: usize = 10;

const SECRET_BYTES: usize = 20;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// AES-256-GCM cipher for TOTP secrets at rest.
///
/// The key is the SHA-256 digest of the configured passphrase, derived once
/// when the service starts. Ciphertexts are stored as
/// `hex(iv):hex(tag):hex(ciphertext)`.
pub struct MfaCipher {
    key: Zeroizing<[u8; 32]>,
}

impl MfaCipher {
    pub fn new(passphrase: &str) -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&Sha256::digest(passphrase.as_bytes()));
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, anyhow::Error> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()));
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("MFA secret encryption failed: {}", e))?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    /// Returns `None` for malformed input, a wrong key, or tampering.
    pub fn decrypt(&self, stored: &str) -> Option<Zeroizing<String>> {
        let mut parts = stored.split(':');
        let (iv, tag, ciphertext) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        let iv = hex::decode(iv).ok()?;
        let tag = hex::decode(tag).ok()?;
        let mut sealed = hex::decode(ciphertext).ok()?;
        if iv.len() != NONCE_SIZE || tag.len() != TAG_SIZE {
            return None;
        }
        sealed.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()));
        match cipher.decrypt(Nonce::from_slice(&iv), sealed.as_slice()) {
            Ok(plain) => String::from_utf8(plain).ok().map(Zeroizing::new),
            Err(_) => {
                tracing::warn!("MFA secret failed to decrypt");
                None
            }
        }
    }
}

/// New random base32 TOTP secret.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}

fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let cleaned: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .collect::<String>()
        .to_uppercase();
    BASE32_NOPAD.decode(cleaned.as_bytes()).ok()
}

/// RFC 4226 HOTP value for one counter.
fn hotp(key: &[u8], counter: u64) -> Option<u32> {
    let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(key).ok()?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    Some(binary % 10u32.pow(TOTP_DIGITS))
}

/// TOTP code for a base32 secret at a unix timestamp.
pub fn totp_at(secret: &str, unix_seconds: i64) -> Option<String> {
    let key = decode_secret(secret)?;
    let counter = u64::try_from(unix_seconds.div_euclid(TOTP_STEP_SECONDS)).ok()?;
    hotp(&key, counter).map(|v| format!("{:0width$}", v, width = TOTP_DIGITS as usize))
}

/// Accepts the code for the current step or one step either side.
pub fn verify_totp(secret: &str, code: &str, unix_seconds: i64) -> bool {
    let code = code.trim().replace(' ', "");
    if code.len() != TOTP_DIGITS as usize || !code.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    (-TOTP_SKEW_STEPS..=TOTP_SKEW_STEPS).any(|skew| {
        totp_at(secret, unix_seconds + skew * TOTP_STEP_SECONDS)
            .map(|expected| constant_time_eq(expected.as_bytes(), code.as_bytes()))
            .unwrap_or(false)
    })
}

/// Provisioning URI understood by authenticator apps.
pub fn otpauth_uri(issuer: &str, account: &str, secret: &str) -> String {
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
        urlencoding::encode(issuer),
        urlencoding::encode(account),
        secret,
        urlencoding::encode(issuer),
        TOTP_DIGITS,
        TOTP_STEP_SECONDS
    )
}

/// One-time recovery codes, formatted `xxxxx-xxxxx`.
pub fn generate_backup_codes() -> Vec<String> {
    (0..BACKUP_CODE_COUNT)
        .map(|_| {
            let mut bytes = [0u8; 5];
            rand::thread_rng().fill_bytes(&mut bytes);
            let raw = hex::encode(bytes);
            format!("{}-{}", &raw[..5], &raw[5..])
        })
        .collect()
}

pub fn hash_backup_code(code: &str) -> String {
    let normalized: String = code
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Index of the stored hash matching `code`, if any.
pub fn match_backup_code(stored_hashes: &[String], code: &str) -> Option<usize> {
    let candidate = hash_backup_code(code);
    stored_hashes
        .iter()
        .position(|h| constant_time_eq(h.as_bytes(), candidate.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 appendix B secret "12345678901234567890"
    fn rfc_secret() -> String {
        BASE32_NOPAD.encode(b"12345678901234567890")
    }

    #[test]
    fn matches_rfc6238_vectors() {
        assert_eq!(totp_at(&rfc_secret(), 59).as_deref(), Some("287082"));
        assert_eq!(totp_at(&rfc_secret(), 1111111109).as_deref(), Some("081804"));
        assert_eq!(totp_at(&rfc_secret(), 1234567890).as_deref(), Some("005924"));
    }

    #[test]
    fn accepts_adjacent_steps_only() {
        let secret = generate_secret();
        let now = 1_700_000_000;
        let code = totp_at(&secret, now).unwrap();
        assert!(verify_totp(&secret, &code, now));
        assert!(verify_totp(&secret, &code, now + TOTP_STEP_SECONDS));
        assert!(verify_totp(&secret, &code, now - TOTP_STEP_SECONDS));
        assert!(!verify_totp(&secret, &code, now + 3 * TOTP_STEP_SECONDS));
    }

    #[test]
    fn rejects_malformed_codes() {
        let secret = generate_secret();
        assert!(!verify_totp(&secret, "12345", 0));
        assert!(!verify_totp(&secret, "abcdef", 0));
        assert!(!verify_totp("not base32!", "123456", 0));
    }

    #[test]
    fn cipher_round_trip_and_tamper_detection() {
        let cipher = MfaCipher::new("unit-test-passphrase");
        let stored = cipher.encrypt("JBSWY3DPEHPK3PXP").unwrap();
        assert_eq!(stored.split(':').count(), 3);
        assert_eq!(cipher.decrypt(&stored).unwrap().as_str(), "JBSWY3DPEHPK3PXP");

        let other = MfaCipher::new("different-passphrase");
        assert!(other.decrypt(&stored).is_none());

        let mut parts: Vec<String> = stored.split(':').map(String::from).collect();
        parts[2] = format!("00{}", &parts[2][2..]);
        if parts[2] != stored.split(':').nth(2).unwrap() {
            assert!(cipher.decrypt(&parts.join(":")).is_none());
        }
        assert!(cipher.decrypt("garbage").is_none());
    }

    #[test]
    fn backup_codes_match_once_normalized() {
        let codes = generate_backup_codes();
        assert_eq!(codes.len(), BACKUP_CODE_COUNT);
        let hashes: Vec<String> = codes.iter().map(|c| hash_backup_code(c)).collect();
        assert_eq!(match_backup_code(&hashes, &codes[3].to_uppercase()), Some(3));
        assert_eq!(match_backup_code(&hashes, "00000-00000"), None);
    }

    #[test]
    fn otpauth_uri_is_encoded() {
        let uri = otpauth_uri("Agency Admin", "a@b.co", "ABC");
        assert!(uri.starts_with("otpauth://totp/Agency%20Admin:a%40b.co?secret=ABC"));
    }
}
