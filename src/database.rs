use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;

/// Postgres pool shared by the catalog loader and the ledger.
#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .min_connections(config.pool_size.min(2))
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .connect(&config.url)
            .await?;

        info!("Database pool ready ({} connections max)", config.pool_size);
        Ok(Database { pool })
    }

    /// Creates the ledger tables and seeds the route catalog on first start.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        let migrator = sqlx::migrate!("./src/migrations");
        info!("Applying {} database migration(s)", migrator.iter().count());
        migrator.run(&self.pool).await?;
        Ok(())
    }
}
