use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::logging::init_tracing;
use shelter_service::{
    build_router,
    config::ShelterConfig,
    db,
    services::{
        AuthService, AuthorizationGate, Database, EditingLockManager, EmailService,
        LockSweepJob, MediaCache, MediaRepository, Reaper, RedisService, ResponseCache,
        TokenService, TokenSweepJob,
    },
    AppState,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = ShelterConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting shelter service"
    );

    let pool = db::create_pool(&config.database, &config.service_name)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;
    let database = Arc::new(Database::new(pool));
    tracing::info!("Database initialized successfully");

    let redis = RedisService::connect(&config.redis)
        .await
        .map_err(service_core::error::AppError::ConfigError)?;
    let cache_backend = Arc::new(redis);
    tracing::info!("Redis service initialized");

    let email = Arc::new(EmailService::new(&config.smtp)?);
    tracing::info!("Email service initialized");

    let tokens = TokenService::new(&config.token, database.clone())?;
    let locks = EditingLockManager::new(database.clone(), config.crm.editing_lock_expire_minutes);
    let media_cache = Arc::new(MediaCache::new(
        config.cache.media_cache_size,
        config.cache.media_cache_record_limit,
    ));
    let media = MediaRepository::new(
        database.clone(),
        media_cache,
        config.cache.blob_chunk_size,
    );
    let permissions_cache = Arc::new(ResponseCache::new(
        "permissions",
        cache_backend.clone(),
        config.cache.default_ttl_seconds,
    ));
    let roles_cache = Arc::new(ResponseCache::new(
        "roles",
        cache_backend.clone(),
        config.cache.default_ttl_seconds,
    ));
    let users_cache = Arc::new(ResponseCache::new(
        "users",
        cache_backend.clone(),
        config.cache.default_ttl_seconds,
    ));
    let auth_service = AuthService::new(
        database.clone(),
        tokens.clone(),
        email,
        config.urls.clone(),
    );
    auth_service.ensure_super_user(&config.super_user).await?;

    let login_rate_limiter =
        create_ip_rate_limiter(config.rate_limit.times, config.rate_limit.seconds);
    let invite_rate_limiter =
        create_ip_rate_limiter(config.rate_limit.times, config.rate_limit.seconds);
    let password_rate_limiter =
        create_ip_rate_limiter(config.rate_limit.times, config.rate_limit.seconds);
    tracing::info!(
        times = config.rate_limit.times,
        seconds = config.rate_limit.seconds,
        "Rate limiters initialized: Login, Invite, Forgot Password"
    );

    let reaper = Reaper::new(Duration::from_secs(config.scheduler.frequency_seconds))
        .with_job(Arc::new(TokenSweepJob::new(database.clone())))
        .with_job(Arc::new(LockSweepJob::new(locks.clone())));
    let reaper_shutdown = reaper.shutdown_token();
    let reaper_handle = reaper.start();

    let state = AppState {
        config: config.clone(),
        db_health: database.clone(),
        cache_backend,
        directory: database,
        tokens,
        gate: AuthorizationGate::new(&config.super_user),
        locks,
        auth_service,
        media,
        permissions_cache,
        roles_cache,
        users_cache,
        login_rate_limiter,
        invite_rate_limiter,
        password_rate_limiter,
    };
    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    reaper_shutdown.cancel();
    if let Err(e) = reaper_handle.await {
        tracing::error!(error = %e, "Reaper task ended abnormally");
    }

    tracing::info!("Service shutdown complete");
    Ok(())
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
