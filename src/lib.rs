pub mod config;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod rate_limit;
pub mod store;

use crate::config::RateLimiterConfig;
use crate::error::{RateLimitError, Result};
use crate::metrics::{metrics_handler, MetricsService};
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::store::{CounterStore, MemoryCounterStore, RedisCounterStore};
use axum::{
    extract::Request,
    middleware::from_fn_with_state,
    routing::{any, get},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Connect the counter store named by the configuration
pub async fn connect_store(config: &RateLimiterConfig) -> Result<Arc<dyn CounterStore>> {
    match &config.redis {
        Some(redis) => {
            let store = RedisCounterStore::new(&redis.url).await?;
            store.ping().await?;
            info!("Connected to Redis counter store at {}", redis.url);
            Ok(Arc::new(store))
        }
        None => {
            warn!("No Redis configured, counting requests in process memory");
            let store = Arc::new(MemoryCounterStore::new());

            let purged = store.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(PURGE_INTERVAL);
                loop {
                    interval.tick().await;
                    purged.purge_expired();
                }
            });

            Ok(store)
        }
    }
}

/// Build the rate limiter described by the configuration
pub fn build_limiter(config: &RateLimiterConfig, store: Arc<dyn CounterStore>) -> Result<RateLimiter> {
    RateLimiter::builder()
        .policies(config.to_policies()?)
        .store(store)
        .key_prefix(config.key_prefix.clone())
        .trust_proxy(config.trust_proxy)
        .build()
}

/// Echo handler standing in for the protected application
async fn echo_handler(request: Request) -> String {
    format!("{} {}", request.method(), request.uri().path())
}

/// Start a demo server with every path behind the rate limiter
pub async fn init_server(config: RateLimiterConfig) -> Result<()> {
    config.validate()?;

    info!("Starting rate limiter");

    let store = connect_store(&config).await?;
    let limiter = build_limiter(&config, store)?;
    info!("Loaded {} rate limit policies", limiter.policies().policies().len());

    let metrics = MetricsService::new()?;

    let app = Router::new()
        .route("/", any(echo_handler))
        .route("/*path", any(echo_handler))
        .layer(from_fn_with_state(limiter, rate_limit_middleware))
        .route("/metrics", get(metrics_handler).with_state(metrics))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(RateLimitError::Io)?;

    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| RateLimitError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "route_ratelimit=debug,tower_http=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
