use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use curator_api::{
    api::{create_router, AppState},
    config::{Config, RateLimitBackend},
    db::{create_pool, create_redis_client, run_migrations, Cache},
    services::{
        stores::{
            CachedCatalog, CatalogGateway, HistoryStore, PgCatalogGateway, PgHistoryStore,
            PgPlanGateway, PgRateLimitStore, RateLimitStore, RedisRateLimitStore,
        },
        ActorQuota, CandidateRanker, RateLimiter, RationaleGenerator, SmartPicksService,
        SystemClock, TasteProfileBuilder, EXPORT_BUCKET, RECOMMENDATIONS_BUCKET,
    },
};
use tracing_subscriber::EnvFilter;

const ELIGIBLE_PLANS: &[&str] = &["pro", "lifetime"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("curator_api=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let db_pool = create_pool(&config.database_url).await?;
    run_migrations(&db_pool).await?;

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_handle) = Cache::connect(redis_client.clone()).await?;

    let timeout = Duration::from_millis(config.upstream_timeout_ms);

    let history: Arc<dyn HistoryStore> = Arc::new(PgHistoryStore::new(db_pool.clone()));
    let catalog: Arc<dyn CatalogGateway> = Arc::new(CachedCatalog::new(
        Arc::new(PgCatalogGateway::new(db_pool.clone())),
        cache,
        config.genre_cache_ttl_secs,
    ));
    let rate_limit_store: Arc<dyn RateLimitStore> = match config.rate_limit_backend {
        RateLimitBackend::Postgres => Arc::new(PgRateLimitStore::new(db_pool.clone())),
        RateLimitBackend::Redis => {
            Arc::new(RedisRateLimitStore::connect(redis_client).await?)
        }
    };

    let limiter = RateLimiter::new(rate_limit_store, Arc::new(SystemClock))
        .with_bucket(RECOMMENDATIONS_BUCKET, config.recommendations_window_secs)
        .with_bucket(EXPORT_BUCKET, config.export_window_secs);

    let smart_picks = SmartPicksService::new(
        Arc::new(PgPlanGateway::new(
            db_pool.clone(),
            ELIGIBLE_PLANS.iter().map(|p| p.to_string()).collect(),
        )),
        limiter.clone(),
        TasteProfileBuilder::new(history, catalog.clone(), timeout),
        CandidateRanker::new(catalog.clone(), timeout),
        RationaleGenerator::new(catalog, timeout),
        ActorQuota {
            per_user: config.recommendations_user_limit,
            per_ip: config.recommendations_ip_limit,
        },
    );

    let state = AppState::new(smart_picks).with_metered_bucket(
        EXPORT_BUCKET,
        ActorQuota {
            per_user: config.export_user_limit,
            per_ip: config.export_ip_limit,
        },
    );

    spawn_window_gc(limiter, Duration::from_secs(config.rate_limit_gc_interval_secs));

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, backend = ?config.rate_limit_backend, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    cache_handle.shutdown().await;

    Ok(())
}

/// Periodically deletes rate-limit windows that have ended
fn spawn_window_gc(limiter: RateLimiter, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            match limiter.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged expired rate limit windows"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge rate limit windows"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
