mod access;

pub use access::{AccessPolicyConfig, GeoConfig, IpAllowlistConfig, MaintenanceWindowConfig, TimeAccessConfig};

use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

const DEV_CSRF_SECRET: &str = "dev-only-csrf-secret-change-me";
const DEV_MFA_KEY: &str = "dev-only-mfa-encryption-key-change-me";

#[derive(Debug)]
pub struct AdminConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub redis: Option<RedisConfig>,
    pub security: SecurityConfig,
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
    pub access: AccessPolicyConfig,
    pub admin_routes: AdminRoutesConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug)]
pub struct SecurityConfig {
    /// Canonical public origin used for Origin/Referer checks. When unset the
    /// request's own scheme and host are used.
    pub canonical_origin: Option<String>,
    pub allowed_origins: Vec<String>,
    pub csrf_secret: Secret<String>,
    pub mfa_encryption_key: Secret<String>,
    pub mfa_issuer: String,
    pub cron_secret: Option<Secret<String>>,
    pub secure_cookies: bool,
    pub password_breach_check: bool,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub max_concurrent: i64,
    pub lifetime_days: i64,
    pub idle_timeout_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "admin_session".to_string(),
            max_concurrent: 3,
            lifetime_days: 30,
            idle_timeout_minutes: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_ip_attempts: u64,
    pub login_ip_window_seconds: u64,
    pub login_email_attempts: u64,
    pub login_email_window_seconds: u64,
    pub mfa_attempts: u64,
    pub mfa_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_ip_attempts: 5,
            login_ip_window_seconds: 60,
            login_email_attempts: 3,
            login_email_window_seconds: 900,
            mfa_attempts: 3,
            mfa_window_seconds: 60,
            global_ip_limit: 300,
            global_ip_window_seconds: 60,
        }
    }
}

/// Where gated page routes live and where denials are sent.
#[derive(Debug, Clone)]
pub struct AdminRoutesConfig {
    pub protected_prefixes: Vec<String>,
    pub login_path: String,
    pub error_path: String,
}

impl Default for AdminRoutesConfig {
    fn default() -> Self {
        Self {
            protected_prefixes: vec!["/admin".to_string(), "/api/admin".to_string()],
            login_path: "/admin/login".to_string(),
            error_path: "/admin/error".to_string(),
        }
    }
}

fn under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

impl AdminRoutesConfig {
    /// Whether the access gate applies. The login and error pages stay
    /// reachable so a denied client can be told why.
    pub fn is_gated(&self, path: &str) -> bool {
        self.protected_prefixes.iter().any(|p| under(path, p))
            && !under(path, &self.login_path)
            && !under(path, &self.error_path)
    }

    pub fn is_api(path: &str) -> bool {
        under(path, "/api")
    }
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Disabled,
}

impl AdminConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AdminConfig {
            common: core_config::Config {
                otlp_endpoint: common_config
                    .otlp_endpoint
                    .clone()
                    .or_else(|| env::var("OTLP_ENDPOINT").ok()),
                ..common_config
            },
            environment: environment.clone(),
            service_name: get_env_or("SERVICE_NAME", "admin-service"),
            service_version: get_env_or("SERVICE_VERSION", env!("CARGO_PKG_VERSION")),
            log_level: get_env_or("LOG_LEVEL", "info"),
            database: DatabaseConfig {
                url: get_env(
                    "DATABASE_URL",
                    Some("postgres://localhost/agency_admin"),
                    is_prod,
                )?,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: parse_or("DATABASE_MIN_CONNECTIONS", 1),
            },
            redis: env::var("REDIS_URL")
                .ok()
                .filter(|url| !url.trim().is_empty())
                .map(|url| RedisConfig { url }),
            security: SecurityConfig {
                canonical_origin: env::var("CANONICAL_ORIGIN")
                    .ok()
                    .filter(|o| !o.trim().is_empty()),
                allowed_origins: get_env_or("ALLOWED_ORIGINS", "http://localhost:3000")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                csrf_secret: Secret::new(secret_env("CSRF_SECRET", DEV_CSRF_SECRET, is_prod)?),
                mfa_encryption_key: Secret::new(secret_env(
                    "MFA_ENCRYPTION_KEY",
                    DEV_MFA_KEY,
                    is_prod,
                )?),
                mfa_issuer: get_env_or("MFA_ISSUER", "Agency Admin"),
                cron_secret: env::var("CRON_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty())
                    .map(Secret::new),
                secure_cookies: is_prod,
                password_breach_check: parse_or("PASSWORD_BREACH_CHECK", is_prod),
            },
            session: SessionConfig {
                cookie_name: get_env_or("SESSION_COOKIE_NAME", "admin_session"),
                ..SessionConfig::default()
            },
            rate_limit: RateLimitConfig {
                global_ip_limit: parse_or("RATE_LIMIT_GLOBAL_IP_LIMIT", 300),
                global_ip_window_seconds: parse_or("RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS", 60),
                ..RateLimitConfig::default()
            },
            access: AccessPolicyConfig::from_env(),
            admin_routes: AdminRoutesConfig::default(),
            swagger: SwaggerConfig {
                enabled: get_env_or("ENABLE_SWAGGER", if is_prod { "disabled" } else { "public" })
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }
            if self.security.canonical_origin.is_none() {
                tracing::warn!("CANONICAL_ORIGIN not set; origin checks fall back to the Host header");
            }
        }

        Ok(())
    }

    pub fn is_prod(&self) -> bool {
        self.environment == Environment::Prod
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Unparseable value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn secret_env(key: &str, dev_default: &str, is_prod: bool) -> Result<String, AppError> {
    let value = get_env(key, Some(dev_default), is_prod)?;
    if value == dev_default {
        tracing::warn!(key, "Using development default secret");
    }
    if value.len() < 16 {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must be at least 16 characters",
            key
        )));
    }
    Ok(value)
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!("development".parse::<Environment>().unwrap(), Environment::Dev);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn gated_paths_respect_segment_boundaries() {
        let routes = AdminRoutesConfig::default();
        assert!(routes.is_gated("/admin"));
        assert!(routes.is_gated("/admin/users"));
        assert!(routes.is_gated("/api/admin/users"));
        assert!(!routes.is_gated("/administrator"));
        assert!(!routes.is_gated("/admin/login"));
        assert!(!routes.is_gated("/admin/error"));
        assert!(!routes.is_gated("/api/auth/login"));
        assert!(AdminRoutesConfig::is_api("/api/admin/users"));
        assert!(!AdminRoutesConfig::is_api("/admin/users"));
    }

    #[test]
    fn session_defaults() {
        let session = SessionConfig::default();
        assert_eq!(session.max_concurrent, 3);
        assert_eq!(session.lifetime_days, 30);
        assert_eq!(session.idle_timeout_minutes, 60);
    }
}
