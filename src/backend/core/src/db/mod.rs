//! Database layer for CallMonitor.
//!
//! Uses PostgreSQL with sqlx. Tenant isolation is enforced by the schema
//! itself (row-level security and append-only triggers); the stores here
//! only set the session scope and map rows.

pub mod directory;
pub mod health;
pub mod records;

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{CallMonitorError, Result};

pub use directory::PgDirectory;
pub use health::{DatabaseHealthMonitor, MigrationValidationResult, RowSecurityStatus};
pub use records::PgRecordStore;

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Database pool created"
        );
        Ok(Self { pool })
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CallMonitorError::from(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn directory(&self) -> PgDirectory {
        PgDirectory::new(self.pool.clone())
    }

    pub fn records(&self) -> PgRecordStore {
        PgRecordStore::new(self.pool.clone())
    }
}
