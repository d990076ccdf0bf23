//! Fixed-window attempt counting for login and MFA endpoints.
//!
//! Redis backs the counters when configured so limits hold across replicas;
//! otherwise an in-process map is used.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::services::error::{ServiceError, ServiceResult};

/// Counter state after recording one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    pub count: u64,
    pub reset_in_secs: u64,
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Records one attempt under `key` and returns the window's count.
    async fn hit(&self, key: &str, window_secs: u64) -> Result<WindowHit, anyhow::Error>;
    async fn clear(&self, key: &str) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisAttemptStore {
    manager: ConnectionManager,
}

impl RedisAttemptStore {
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis for attempt limiting");
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;
        Ok(Self { manager })
    }

    pub async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

#[async_trait]
impl AttemptStore for RedisAttemptStore {
    async fn hit(&self, key: &str, window_secs: u64) -> Result<WindowHit, anyhow::Error> {
        let mut conn = self.manager.clone();
        let (count, ttl): (u64, i64) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(window_secs)
            .arg("NX")
            .ignore()
            .cmd("TTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to record attempt: {}", e))?;
        Ok(WindowHit {
            count,
            reset_in_secs: u64::try_from(ttl).unwrap_or(window_secs),
        })
    }

    async fn clear(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to clear attempts: {}", e))
    }
}

/// Entries above this count trigger a sweep of expired windows.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    started: Instant,
    length: Duration,
}

impl Window {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.started) >= self.length
    }
}

#[derive(Default)]
pub struct MemoryAttemptStore {
    windows: DashMap<String, Window>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every window that has run its course.
    pub fn prune(&self) {
        let now = Instant::now();
        self.windows.retain(|_, w| !w.expired(now));
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn hit(&self, key: &str, window_secs: u64) -> Result<WindowHit, anyhow::Error> {
        if self.windows.len() >= PRUNE_THRESHOLD {
            self.prune();
        }

        let length = Duration::from_secs(window_secs);
        let now = Instant::now();
        let fresh = Window {
            count: 0,
            started: now,
            length,
        };
        let mut entry = self.windows.entry(key.to_string()).or_insert(fresh);
        if entry.expired(now) {
            *entry = fresh;
        }
        entry.count += 1;
        let elapsed = now.duration_since(entry.started);
        Ok(WindowHit {
            count: entry.count,
            reset_in_secs: length.saturating_sub(elapsed).as_secs().max(1),
        })
    }

    async fn clear(&self, key: &str) -> Result<(), anyhow::Error> {
        self.windows.remove(key);
        Ok(())
    }
}

#[derive(Clone)]
pub struct AttemptLimiter {
    store: Arc<dyn AttemptStore>,
    config: RateLimitConfig,
}

impl AttemptLimiter {
    pub fn new(store: Arc<dyn AttemptStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Counts one attempt against `key`. Store failures let the attempt through.
    pub async fn check(&self, key: &str, limit: u64, window_secs: u64) -> ServiceResult<()> {
        match self.store.hit(key, window_secs).await {
            Ok(hit) if hit.count > limit => {
                metrics::counter!("admin_rate_limited_total").increment(1);
                Err(ServiceError::RateLimited {
                    retry_after_secs: hit.reset_in_secs,
                })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, key, "Attempt store unavailable, not limiting");
                Ok(())
            }
        }
    }

    /// Per-IP limit first, then per-email.
    pub async fn check_login(&self, ip: &str, email: &str) -> ServiceResult<()> {
        self.check(
            &format!("rl:login:{}", ip),
            self.config.login_ip_attempts,
            self.config.login_ip_window_seconds,
        )
        .await?;
        self.check(
            &format!("rl:email:{}", email.trim().to_lowercase()),
            self.config.login_email_attempts,
            self.config.login_email_window_seconds,
        )
        .await
    }

    pub async fn check_mfa(&self, user_id: uuid::Uuid) -> ServiceResult<()> {
        self.check(
            &format!("rl:mfa:{}", user_id),
            self.config.mfa_attempts,
            self.config.mfa_window_seconds,
        )
        .await
    }

    pub async fn clear_email(&self, email: &str) {
        let key = format!("rl:email:{}", email.trim().to_lowercase());
        if let Err(e) = self.store.clear(&key).await {
            tracing::warn!(error = %e, "Failed to clear login attempts");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    #[async_trait]
    impl AttemptStore for FailingStore {
        async fn hit(&self, _key: &str, _window_secs: u64) -> Result<WindowHit, anyhow::Error> {
            Err(anyhow::anyhow!("down"))
        }
        async fn clear(&self, _key: &str) -> Result<(), anyhow::Error> {
            Err(anyhow::anyhow!("down"))
        }
    }

    fn limiter() -> AttemptLimiter {
        AttemptLimiter::new(Arc::new(MemoryAttemptStore::new()), RateLimitConfig::default())
    }

    #[tokio::test]
    async fn sixth_login_from_one_ip_is_limited() {
        let limiter = limiter();
        for i in 0..5 {
            // distinct emails so only the IP bucket fills
            let email = format!("user{}@example.com", i);
            assert!(limiter.check_login("10.0.0.1", &email).await.is_ok());
        }
        let err = limiter
            .check_login("10.0.0.1", "other@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RateLimited { retry_after_secs } if retry_after_secs > 0));
        assert!(limiter.check_login("10.0.0.2", "other@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn fourth_attempt_for_one_email_is_limited() {
        let limiter = limiter();
        let ips = ["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"];
        for ip in &ips[..3] {
            assert!(limiter.check_login(ip, "Victim@Example.com").await.is_ok());
        }
        assert!(limiter.check_login(ips[3], "victim@example.com").await.is_err());

        limiter.clear_email("victim@example.com").await;
        assert!(limiter.check_login("10.0.0.5", "victim@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn store_failure_fails_open() {
        let limiter = AttemptLimiter::new(Arc::new(FailingStore), RateLimitConfig::default());
        for _ in 0..20 {
            assert!(limiter.check_login("10.0.0.1", "a@b.co").await.is_ok());
        }
    }

    #[tokio::test]
    async fn memory_window_resets() {
        let store = MemoryAttemptStore::new();
        assert_eq!(store.hit("k", 0).await.unwrap().count, 1);
        assert_eq!(store.hit("k", 0).await.unwrap().count, 1);
        assert_eq!(store.hit("j", 60).await.unwrap().count, 1);
        assert_eq!(store.hit("j", 60).await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn expired_windows_are_pruned() {
        let store = MemoryAttemptStore::new();
        for i in 0..10_000 {
            store.hit(&format!("rl:email:{}@example.com", i), 0).await.unwrap();
        }
        store.hit("rl:login:10.0.0.1", 60).await.unwrap();
        assert!(store.len() < PRUNE_THRESHOLD, "{} entries kept", store.len());

        store.prune();
        assert_eq!(store.len(), 1);
        assert_eq!(store.hit("rl:login:10.0.0.1", 60).await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn live_windows_survive_a_sweep() {
        let store = MemoryAttemptStore::new();
        for i in 0..PRUNE_THRESHOLD {
            store.hit(&format!("rl:mfa:{}", i), 60).await.unwrap();
        }
        store.hit("rl:mfa:extra", 60).await.unwrap();
        assert_eq!(store.len(), PRUNE_THRESHOLD + 1);
    }
}
