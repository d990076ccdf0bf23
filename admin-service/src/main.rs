use admin_service::{
    build_router,
    config::AdminConfig,
    db,
    services::{
        password_policy::PWNED_PASSWORDS_URL, AccessPolicy, AttemptLimiter, AttemptStore,
        AuditWriter, AuthService, BreachChecker, CsrfGuard, Database, MemoryAttemptStore,
        MfaCipher, NoBreachCheck, PwnedPasswordsChecker, RedisAttemptStore, SessionService,
    },
    AppState,
};
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use service_core::middleware::rate_limit::{
    create_ip_rate_limiter, spawn_ip_rate_limiter_pruning,
};
use service_core::observability::{logging::init_tracing, metrics::init_metrics};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;

const PRUNE_PERIOD: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // Fail fast on bad configuration
    let config = AdminConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.common.otlp_endpoint.as_deref(),
    )
    .map_err(AppError::ConfigError)?;

    let metrics = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Metrics recorder not installed");
            None
        }
    };

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting admin service"
    );

    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
    let database = Database::new(pool);
    tracing::info!("Database initialized successfully");

    let attempt_store: Arc<dyn AttemptStore> = match &config.redis {
        Some(redis) => match RedisAttemptStore::connect(&redis.url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, using in-process attempt store");
                memory_attempt_store()
            }
        },
        None => {
            tracing::warn!("REDIS_URL not set, using in-process attempt store");
            memory_attempt_store()
        }
    };

    let breach_checker: Arc<dyn BreachChecker> = if config.security.password_breach_check {
        Arc::new(PwnedPasswordsChecker::new(PWNED_PASSWORDS_URL).map_err(AppError::ConfigError)?)
    } else {
        Arc::new(NoBreachCheck)
    };

    let access_policy = match AccessPolicy::compile(&config.access) {
        Ok(policy) => policy,
        Err(e) => {
            tracing::error!(error = %e, "Invalid admin access policy, every check disabled");
            AccessPolicy::allow_all()
        }
    };

    let cipher = Arc::new(MfaCipher::new(config.security.mfa_encryption_key.expose_secret()));
    let csrf = Arc::new(CsrfGuard::new(Secret::new(
        config.security.csrf_secret.expose_secret().clone(),
    )));

    let sessions = SessionService::new(database.clone(), config.session.clone());
    let limiter = AttemptLimiter::new(attempt_store, config.rate_limit.clone());
    let auth = AuthService::new(
        database.clone(),
        sessions.clone(),
        limiter,
        cipher,
        breach_checker,
        config.security.mfa_issuer.clone(),
    );
    let audit = AuditWriter::new(database.clone());

    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );
    spawn_ip_rate_limiter_pruning(ip_rate_limiter.clone(), PRUNE_PERIOD);
    tracing::info!("Services initialized");

    let port = config.common.port;
    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );

    let state = AppState {
        config: Arc::new(config),
        db: database,
        access_policy: Arc::new(access_policy),
        csrf,
        auth,
        sessions,
        audit,
        metrics,
        ip_rate_limiter,
    };
    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let _guard = service_span.enter();
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

/// In-process attempt store with a background sweep of expired windows.
fn memory_attempt_store() -> Arc<dyn AttemptStore> {
    let store = Arc::new(MemoryAttemptStore::new());
    let sweeper = store.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_PERIOD);
        loop {
            ticker.tick().await;
            sweeper.prune();
        }
    });
    store
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
