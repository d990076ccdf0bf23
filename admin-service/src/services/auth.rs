//! Login, password change and the TOTP lifecycle.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AdminUser, SessionInvalid, User};
use crate::services::attempt_limiter::AttemptLimiter;
use crate::services::database::Database;
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::mfa::{self, MfaCipher};
use crate::services::password_policy::{self, BreachChecker};
use crate::services::sessions::{IssuedSession, SessionService};
use crate::utils::password::{dummy_verify, hash_password, verify_password, Password};

/// Outcome of checking the second factor for one login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondFactor {
    NotEnrolled,
    Totp,
    /// Matched the backup code stored under this hash; it must be consumed.
    BackupCode(String),
    Missing,
    Invalid,
}

/// Checks a submitted code against the user's enrolment. Undecryptable
/// secrets count as an invalid code.
pub fn check_second_factor(
    cipher: &MfaCipher,
    encrypted_secret: Option<&str>,
    backup_hashes: &[String],
    code: Option<&str>,
    unix_now: i64,
) -> SecondFactor {
    let Some(encrypted) = encrypted_secret else {
        return SecondFactor::NotEnrolled;
    };
    let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
        return SecondFactor::Missing;
    };
    let Some(secret) = cipher.decrypt(encrypted) else {
        tracing::error!("Stored MFA secret could not be decrypted");
        return SecondFactor::Invalid;
    };
    if mfa::verify_totp(&secret, code, unix_now) {
        return SecondFactor::Totp;
    }
    match mfa::match_backup_code(backup_hashes, code) {
        Some(index) => SecondFactor::BackupCode(backup_hashes[index].clone()),
        None => SecondFactor::Invalid,
    }
}

pub struct LoginAttempt {
    pub email: String,
    pub password: Password,
    pub mfa_code: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

pub struct LoginSuccess {
    pub user: User,
    pub session: IssuedSession,
}

/// Material shown to the user once when MFA is being set up.
pub struct MfaEnrollment {
    pub secret: String,
    pub otpauth_uri: String,
}

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    sessions: SessionService,
    limiter: AttemptLimiter,
    cipher: Arc<MfaCipher>,
    breach_checker: Arc<dyn BreachChecker>,
    mfa_issuer: String,
}

impl AuthService {
    pub fn new(
        db: Database,
        sessions: SessionService,
        limiter: AttemptLimiter,
        cipher: Arc<MfaCipher>,
        breach_checker: Arc<dyn BreachChecker>,
        mfa_issuer: String,
    ) -> Self {
        Self {
            db,
            sessions,
            limiter,
            cipher,
            breach_checker,
            mfa_issuer,
        }
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    // ==================== Login ====================

    pub async fn login(&self, attempt: LoginAttempt) -> ServiceResult<LoginSuccess> {
        let ip = attempt.ip_address.as_deref().unwrap_or("unknown");
        self.limiter.check_login(ip, &attempt.email).await?;

        let user = match self.db.find_user_by_email(&attempt.email).await? {
            Some(user) => user,
            None => {
                dummy_verify(&attempt.password);
                tracing::warn!(ip, "Login failed: unknown account");
                return Err(ServiceError::InvalidCredentials);
            }
        };

        let password_ok = user
            .password_hash
            .as_deref()
            .map(|hash| verify_password(&attempt.password, hash))
            .unwrap_or(false);
        if !password_ok {
            tracing::warn!(user_id = %user.id, ip, "Login failed: bad password");
            return Err(ServiceError::InvalidCredentials);
        }

        match check_second_factor(
            &self.cipher,
            user.mfa_secret.as_deref(),
            &user.mfa_backup_codes,
            attempt.mfa_code.as_deref(),
            Utc::now().timestamp(),
        ) {
            SecondFactor::NotEnrolled | SecondFactor::Totp => {}
            SecondFactor::BackupCode(hash) => {
                if !self.db.consume_backup_code(user.id, &hash).await? {
                    return Err(ServiceError::InvalidMfaCode);
                }
                tracing::info!(user_id = %user.id, "Backup code used for login");
            }
            SecondFactor::Missing => return Err(ServiceError::MfaRequired),
            SecondFactor::Invalid => {
                tracing::warn!(user_id = %user.id, ip, "Login failed: invalid MFA code");
                return Err(ServiceError::InvalidMfaCode);
            }
        }

        let session = self
            .sessions
            .create(user.id, attempt.ip_address.clone(), attempt.user_agent.clone())
            .await?;
        self.db.record_login(user.id).await?;
        self.limiter.clear_email(&attempt.email).await;

        tracing::info!(user_id = %user.id, session_id = %session.session.id, "Login succeeded");
        Ok(LoginSuccess { user, session })
    }

    /// Session token to admin context: live session, live user, effective
    /// permissions. Deleted users look like a missing session.
    pub async fn resolve_admin(&self, token: &str) -> ServiceResult<AdminUser> {
        let session = self.sessions.validate(token).await?;
        let user = self
            .db
            .find_user_by_id(session.user_id)
            .await?
            .ok_or(SessionInvalid::NotFound)?;
        let (roles, permissions) = self.db.effective_permissions(user.id).await?;
        Ok(AdminUser {
            id: user.id,
            email: user.email,
            name: user.name,
            roles,
            permissions,
            tenant_id: user.tenant_id,
            session_id: session.id,
        })
    }

    // ==================== Password ====================

    /// Verifies the current password, vets the new one, then swaps hashes
    /// and revokes every session. Returns how many sessions were revoked.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current: &Password,
        new: &Password,
    ) -> ServiceResult<u64> {
        let user = self
            .db
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;

        let current_hash = user.password_hash.as_deref();
        if !current_hash.map(|h| verify_password(current, h)).unwrap_or(false) {
            return Err(ServiceError::InvalidCredentials);
        }

        let problems = password_policy::check_strength(new.as_str());
        if !problems.is_empty() {
            return Err(ServiceError::WeakPassword(problems));
        }

        let mut previous = self.db.recent_password_hashes(user_id).await?;
        previous.extend(current_hash.map(str::to_string));
        if password_policy::reused(new, &previous) {
            return Err(ServiceError::WeakPassword(vec![
                "Password was used recently".to_string(),
            ]));
        }

        if self.breach_checker.is_breached(new).await {
            return Err(ServiceError::WeakPassword(vec![
                "Password appears in a known data breach".to_string(),
            ]));
        }

        let new_hash = hash_password(new)?;
        let revoked = self
            .db
            .change_password(user_id, new_hash.as_str(), current_hash)
            .await?;
        tracing::info!(user_id = %user_id, revoked, "Password changed, sessions revoked");
        Ok(revoked)
    }

    /// Creates an account with a vetted password. Duplicate emails surface
    /// as a conflict from the unique index.
    pub async fn create_user(
        &self,
        email: &str,
        name: Option<String>,
        password: &Password,
        tenant_id: Option<Uuid>,
    ) -> ServiceResult<User> {
        let problems = password_policy::check_strength(password.as_str());
        if !problems.is_empty() {
            return Err(ServiceError::WeakPassword(problems));
        }
        if self.breach_checker.is_breached(password).await {
            return Err(ServiceError::WeakPassword(vec![
                "Password appears in a known data breach".to_string(),
            ]));
        }

        let hash = hash_password(password)?;
        let user = User::new(email.to_string(), name, Some(hash.into_string()), tenant_id);
        let user = self.db.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, tenant_id = ?user.tenant_id, "User created");
        Ok(user)
    }

    // ==================== MFA ====================

    pub async fn generate_mfa(&self, admin: &AdminUser) -> ServiceResult<MfaEnrollment> {
        self.limiter.check_mfa(admin.id).await?;
        let secret = mfa::generate_secret();
        let otpauth_uri = mfa::otpauth_uri(&self.mfa_issuer, &admin.email, &secret);
        Ok(MfaEnrollment { secret, otpauth_uri })
    }

    /// Stores `secret` once `code` proves the authenticator holds it.
    /// Returns the plaintext backup codes; only their hashes are kept.
    pub async fn enable_mfa(&self, admin: &AdminUser, secret: &str, code: &str) -> ServiceResult<Vec<String>> {
        self.limiter.check_mfa(admin.id).await?;
        let user = self
            .db
            .find_user_by_id(admin.id)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;
        if user.mfa_enabled() {
            return Err(ServiceError::InvalidState("MFA is already enabled".to_string()));
        }
        if !mfa::verify_totp(secret, code, Utc::now().timestamp()) {
            tracing::warn!(user_id = %admin.id, "MFA enable rejected: code mismatch");
            return Err(ServiceError::InvalidMfaCode);
        }

        let encrypted = self.cipher.encrypt(secret)?;
        let codes = mfa::generate_backup_codes();
        let hashes: Vec<String> = codes.iter().map(|c| mfa::hash_backup_code(c)).collect();
        self.db.set_mfa(admin.id, Some(&encrypted), &hashes).await?;
        tracing::info!(user_id = %admin.id, "MFA enabled");
        Ok(codes)
    }

    pub async fn disable_mfa(&self, admin: &AdminUser, code: &str) -> ServiceResult<()> {
        self.limiter.check_mfa(admin.id).await?;
        let user = self
            .db
            .find_user_by_id(admin.id)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;
        match check_second_factor(
            &self.cipher,
            user.mfa_secret.as_deref(),
            &user.mfa_backup_codes,
            Some(code),
            Utc::now().timestamp(),
        ) {
            SecondFactor::Totp | SecondFactor::BackupCode(_) => {}
            SecondFactor::NotEnrolled => {
                return Err(ServiceError::InvalidState("MFA is not enabled".to_string()))
            }
            SecondFactor::Missing | SecondFactor::Invalid => {
                tracing::warn!(user_id = %admin.id, "MFA disable rejected: invalid code");
                return Err(ServiceError::InvalidMfaCode);
            }
        }
        self.db.set_mfa(admin.id, None, &[]).await?;
        tracing::info!(user_id = %admin.id, "MFA disabled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn enrolled() -> (MfaCipher, String, String, Vec<String>, Vec<String>) {
        let cipher = MfaCipher::new("auth-service-test-key");
        let secret = mfa::generate_secret();
        let encrypted = cipher.encrypt(&secret).unwrap();
        let codes = mfa::generate_backup_codes();
        let hashes = codes.iter().map(|c| mfa::hash_backup_code(c)).collect();
        (cipher, secret, encrypted, codes, hashes)
    }

    #[test]
    fn not_enrolled_needs_no_code() {
        let cipher = MfaCipher::new("auth-service-test-key");
        assert_eq!(
            check_second_factor(&cipher, None, &[], None, NOW),
            SecondFactor::NotEnrolled
        );
    }

    #[test]
    fn enrolled_without_code_requires_mfa() {
        let (cipher, _, encrypted, _, hashes) = enrolled();
        assert_eq!(
            check_second_factor(&cipher, Some(&encrypted), &hashes, None, NOW),
            SecondFactor::Missing
        );
        assert_eq!(
            check_second_factor(&cipher, Some(&encrypted), &hashes, Some("  "), NOW),
            SecondFactor::Missing
        );
    }

    #[test]
    fn valid_totp_and_backup_code_pass() {
        let (cipher, secret, encrypted, codes, hashes) = enrolled();
        let code = mfa::totp_at(&secret, NOW).unwrap();
        assert_eq!(
            check_second_factor(&cipher, Some(&encrypted), &hashes, Some(&code), NOW),
            SecondFactor::Totp
        );
        assert_eq!(
            check_second_factor(&cipher, Some(&encrypted), &hashes, Some(&codes[0]), NOW),
            SecondFactor::BackupCode(hashes[0].clone())
        );
    }

    #[test]
    fn wrong_code_or_wrong_key_is_invalid() {
        let (cipher, secret, encrypted, _, hashes) = enrolled();
        let stale = mfa::totp_at(&secret, NOW - 10 * mfa::TOTP_STEP_SECONDS).unwrap();
        let current = mfa::totp_at(&secret, NOW).unwrap();
        if stale != current {
            assert_eq!(
                check_second_factor(&cipher, Some(&encrypted), &hashes, Some(&stale), NOW),
                SecondFactor::Invalid
            );
        }
        let other = MfaCipher::new("rotated-encryption-key");
        assert_eq!(
            check_second_factor(&other, Some(&encrypted), &hashes, Some(&current), NOW),
            SecondFactor::Invalid
        );
    }
}
