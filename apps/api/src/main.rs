mod analysis;
mod analysis_client;
mod config;
mod errors;
mod models;
mod rate_limit;
mod routes;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::{Coordinator, CoordinatorSettings};
use crate::analysis_client::AnalysisClient;
use crate::config::Config;
use crate::rate_limit::{
    LedgerStore, MemoryLedgerStore, RateLimitPolicy, RateLimiter, RedisLedgerStore, SystemClock,
};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Match API v{}", env!("CARGO_PKG_VERSION"));

    match &config.analyze_url {
        Some(url) => info!("Analysis endpoint: {url}"),
        None => warn!("ANALYZE_URL is not set; every analysis will fail as not configured"),
    }

    // Rate-limit ledger: Redis when configured, otherwise process memory
    let store: Arc<dyn LedgerStore> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str()).context("Invalid REDIS_URL")?;
            info!("Rate-limit ledger backed by Redis");
            Arc::new(RedisLedgerStore::new(client))
        }
        None => {
            warn!("REDIS_URL is not set; rate-limit ledger will not survive restarts");
            Arc::new(MemoryLedgerStore::new())
        }
    };

    let policy = RateLimitPolicy {
        max_requests: config.rate_limit_max_requests,
        window_ms: config.rate_limit_window_ms,
    };
    info!(
        "Rate limit: {} requests per {}ms",
        policy.max_requests, policy.window_ms
    );
    let limiter = Arc::new(
        RateLimiter::new(store, Arc::new(SystemClock), policy)
            .with_store_timeout(Duration::from_millis(config.ledger_timeout_ms)),
    );

    let transport = Arc::new(AnalysisClient::new()?);

    let coordinator = Arc::new(Coordinator::new(
        CoordinatorSettings {
            endpoint: config.analyze_url.clone(),
            timeout: Duration::from_millis(config.analyze_timeout_ms),
            max_input_chars: config.max_input_chars,
        },
        transport,
        limiter.clone(),
    ));

    let state = AppState {
        coordinator,
        limiter,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the UI host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
