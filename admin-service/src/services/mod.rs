pub mod access_gate;
pub mod attempt_limiter;
pub mod audit;
pub mod auth;
pub mod csrf;
pub mod database;
pub mod error;
pub mod mfa;
pub mod origin;
pub mod password_policy;
pub mod sessions;
pub mod tenant_scope;

pub use access_gate::{AccessDecision, AccessPolicy, DenyReason};
pub use attempt_limiter::{AttemptLimiter, AttemptStore, MemoryAttemptStore, RedisAttemptStore};
pub use audit::AuditWriter;
pub use auth::AuthService;
pub use csrf::CsrfGuard;
pub use database::Database;
pub use error::{ServiceError, ServiceResult};
pub use mfa::MfaCipher;
pub use password_policy::{BreachChecker, NoBreachCheck, PwnedPasswordsChecker};
pub use sessions::SessionService;
pub use tenant_scope::{TenantFilter, TenantScopeError};
