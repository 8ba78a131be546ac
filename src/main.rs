use actix::prelude::*;
use anyhow::Context as _;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dinein_orders::actors::OrderActor;
use dinein_orders::config::AppConfig;
use dinein_orders::domain::assignment::StrategyResolver;
use dinein_orders::domain::customer::{CustomerSessionService, LoggingOtpSender};
use dinein_orders::domain::order::{OrderCommandHandler, ReadyTimeEstimator};
use dinein_orders::metrics::{self, Metrics};
use dinein_orders::store::{self, GuardedCounter, PgStore, RedisCounter, RedisSessionStore};
use dinein_orders::utils::CircuitBreaker;

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dinein_orders=debug"))
        )
        .init();

    tracing::info!("Starting dine-in ordering service");

    // === 1. Configuration ===
    let config_path = std::env::var("DINEIN_CONFIG").ok();
    let config = AppConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    let store_timeout = config.orders.store_timeout();

    // === 2. Initialize Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("Metrics registry created with {} metrics", metrics.registry().gather().len());

    if config.metrics.enabled {
        // Separate runtime so the scrape endpoint never competes with actors
        let metrics_registry = Arc::new(metrics.registry().clone());
        let port = config.metrics.port;
        std::thread::spawn(move || match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(async {
                if let Err(e) = metrics::start_metrics_server(metrics_registry, port).await {
                    tracing::error!("Metrics server error: {}", e);
                }
            }),
            Err(e) => tracing::error!("Failed to start metrics runtime: {}", e),
        });
    }

    // === 3. Stores ===
    tracing::info!("Connecting to Postgres...");
    let pg = Arc::new(
        PgStore::connect(
            &config.database.url,
            config.database.max_connections,
            std::time::Duration::from_millis(config.database.acquire_timeout_ms),
        )
        .await
        .context("Failed to connect to Postgres")?,
    );

    tracing::info!("Connecting to Redis...");
    let redis_conn = store::redis::connect(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    let breaker = CircuitBreaker::new("redis_counter", config.redis.breaker())
        .with_transition_hook(metrics.circuit_breaker_hook());
    let counter = Arc::new(GuardedCounter::new(
        Arc::new(RedisCounter::new(redis_conn.clone())),
        breaker,
        config.redis.counter_timeout(),
    ));
    let sessions = Arc::new(RedisSessionStore::new(redis_conn));

    // === 4. Domain services ===
    let session_service = Arc::new(CustomerSessionService::new(
        sessions.clone(),
        sessions,
        Arc::new(LoggingOtpSender),
        config.sessions.policy(),
    ));
    let resolver = StrategyResolver::new(pg.clone(), pg.clone(), pg.clone(), counter, store_timeout)
        .with_counter_timeout(config.redis.counter_timeout());
    let estimator = ReadyTimeEstimator::new(pg.clone(), pg.clone(), store_timeout);
    let handler = Arc::new(OrderCommandHandler::new(
        pg.clone(),
        pg,
        session_service,
        resolver,
        estimator,
        metrics.clone(),
        store_timeout,
    ));

    // === 5. Start Order Actor ===
    let _order_actor = OrderActor::new(handler).start();
    tracing::info!("Order service ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    Ok(())
}
