pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod ledger;
pub mod models;
pub mod redis_client;
pub mod services;

use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use cache::{AvailabilityCache, InMemoryAvailabilityCache, NoopCache, RedisAvailabilityCache};
use catalog::Catalog;
use clock::{Clock, SystemClock};
use ledger::{InMemoryLedger, Ledger, PgLedger};
use services::{BookingEngine, BookingPolicy};

// Shared state for the whole application
pub struct AppState {
    pub config: config::Config,
    pub catalog: Arc<Catalog>,
    pub engine: Arc<BookingEngine>,
}

impl AppState {
    /// Wires storage from configuration: Postgres when `DATABASE_URL` is set,
    /// the in-memory ledger and built-in route otherwise.
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let (catalog, ledger): (Arc<Catalog>, Arc<dyn Ledger>) = match &config.database {
            Some(db_config) => {
                let db = database::Database::connect(db_config).await?;
                db.run_migrations().await?;
                let catalog = Catalog::load(&db).await?;
                (Arc::new(catalog), Arc::new(PgLedger::new(&db)))
            }
            None => {
                warn!("DATABASE_URL not set, bookings are kept in memory only");
                (Arc::new(Catalog::seeded()), Arc::new(InMemoryLedger::new()))
            }
        };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ttl = config.features.seat_cache_ttl_seconds;
        let cache: Arc<dyn AvailabilityCache> = match (&config.redis, config.features.enable_seat_cache) {
            (Some(redis_config), true) => {
                let redis = redis_client::RedisClient::new(&redis_config.url).await?;
                redis.ping().await?;
                Arc::new(RedisAvailabilityCache::new(redis, ttl))
            }
            (None, true) => Arc::new(InMemoryAvailabilityCache::new(Duration::from_secs(ttl), clock.clone())),
            (_, false) => Arc::new(NoopCache),
        };

        info!(
            "Booking engine ready: {} seats on a {}-stop route",
            catalog.list_seats().len(),
            catalog.list_stations().len()
        );
        Self::assemble(config, catalog, ledger, cache, clock)
    }

    /// Database-free state on the built-in route. Used by tests and local runs.
    pub fn in_memory(config: config::Config, clock: Arc<dyn Clock>) -> anyhow::Result<Arc<Self>> {
        let cache: Arc<dyn AvailabilityCache> = if config.features.enable_seat_cache {
            let ttl = Duration::from_secs(config.features.seat_cache_ttl_seconds);
            Arc::new(InMemoryAvailabilityCache::new(ttl, clock.clone()))
        } else {
            Arc::new(NoopCache)
        };
        Self::assemble(
            config,
            Arc::new(Catalog::seeded()),
            Arc::new(InMemoryLedger::new()),
            cache,
            clock,
        )
    }

    fn assemble(
        config: config::Config,
        catalog: Arc<Catalog>,
        ledger: Arc<dyn Ledger>,
        cache: Arc<dyn AvailabilityCache>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Arc<Self>> {
        let policy = BookingPolicy::try_from(&config.booking)?;
        let engine = BookingEngine::new(catalog.clone(), ledger, clock, policy).with_cache(cache);

        Ok(Arc::new(Self {
            config,
            catalog,
            engine: Arc::new(engine),
        }))
    }
}

/// The full HTTP surface: banner, health check and the `/api` routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Sleeper Bus Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes(&state))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
