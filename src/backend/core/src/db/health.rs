//! Database health monitoring and startup validation.
//!
//! Beyond connectivity and migration status, startup validation checks
//! that the isolation the access core relies on is actually in force:
//! row-level security enabled *and* forced on every regulated table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::error::{CallMonitorError, ErrorCode, Result};
use crate::immutability::RegulatedTable;

const SLOW_ROUND_TRIP: Duration = Duration::from_millis(100);

// ═══════════════════════════════════════════════════════════════════════════════
// Migration Validation
// ═══════════════════════════════════════════════════════════════════════════════

/// Embedded migrations compared with `_sqlx_migrations`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MigrationValidationResult {
    pub is_current: bool,
    pub applied_count: usize,
    /// Descriptions of embedded migrations not yet applied.
    pub pending_migrations: Vec<String>,
    pub validated_at: DateTime<Utc>,
}

/// Row-level security state of one table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RowSecurityStatus {
    pub table_name: String,
    pub enabled: bool,
    pub forced: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Database Health Monitor
// ═══════════════════════════════════════════════════════════════════════════════

/// Startup checks run against the live pool before the server binds.
#[derive(Clone)]
pub struct DatabaseHealthMonitor {
    pool: PgPool,
}

impl DatabaseHealthMonitor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Validate that all embedded migrations are applied.
    pub async fn validate_migrations(&self) -> Result<MigrationValidationResult> {
        let migrator = sqlx::migrate!("./migrations");
        let applied: Vec<String> = sqlx::query_scalar(
            "SELECT description FROM _sqlx_migrations WHERE success ORDER BY installed_on",
        )
        .fetch_all(&self.pool)
        .await?;

        let pending: Vec<String> = migrator
            .iter()
            .map(|m| m.description.to_string())
            .filter(|m| !applied.contains(m))
            .collect();

        let result = MigrationValidationResult {
            is_current: pending.is_empty(),
            applied_count: applied.len(),
            pending_migrations: pending,
            validated_at: Utc::now(),
        };

        if result.is_current {
            info!(applied_count = result.applied_count, "All database migrations are applied");
        } else {
            warn!(pending = ?result.pending_migrations, "Database has pending migrations");
        }
        Ok(result)
    }

    /// Row-level security state for every regulated table.
    pub async fn row_security(&self) -> Result<Vec<RowSecurityStatus>> {
        let names: Vec<String> = RegulatedTable::all()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        let rows = sqlx::query_as::<_, RowSecurityStatus>(
            r#"
            SELECT relname::text AS table_name,
                   relrowsecurity AS enabled,
                   relforcerowsecurity AS forced
            FROM pg_class
            WHERE relname = ANY($1) AND relkind = 'r'
            ORDER BY relname
            "#,
        )
        .bind(&names)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Fail unless every regulated table exists with RLS enabled and forced.
    pub async fn verify_isolation(&self) -> Result<()> {
        let statuses = self.row_security().await?;
        for table in RegulatedTable::all() {
            let status = statuses.iter().find(|s| s.table_name == table.name());
            match status {
                Some(s) if s.enabled && s.forced => {}
                _ => {
                    error!(table = table.name(), status = ?status, "Row-level security is not enforced");
                    return Err(CallMonitorError::with_internal(
                        ErrorCode::ConfigurationError,
                        "Database isolation is not configured",
                        format!("row-level security not forced on {}", table.name()),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Migrations current, database reachable, isolation in force.
    pub async fn startup_validation(&self) -> Result<()> {
        let validation = self.validate_migrations().await?;
        if !validation.is_current {
            return Err(CallMonitorError::new(
                ErrorCode::DatabaseError,
                format!(
                    "Database has {} pending migrations",
                    validation.pending_migrations.len()
                ),
            ));
        }

        self.check_connectivity().await?;
        self.verify_isolation().await?;

        info!("Database startup validation passed");
        Ok(())
    }

    /// Round-trip latency of `SELECT 1`.
    pub async fn check_connectivity(&self) -> Result<Duration> {
        let start = Instant::now();
        if let Err(e) = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await {
            error!(error = %e, "Database connectivity check failed");
            return Err(e.into());
        }
        let latency = start.elapsed();
        if latency > SLOW_ROUND_TRIP {
            warn!(latency_ms = latency.as_millis() as u64, "Slow database round trip");
        }
        Ok(latency)
    }
}
