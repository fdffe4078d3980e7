//! PostgreSQL reward sink.
//!
//! Each chunk is inserted inside its own transaction, so a failed chunk leaves no rows
//! behind and can be replayed as a whole.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use super::RewardSink;
use crate::config::DatabaseConfig;
use crate::error::{BatchError, Result};
use crate::models::RewardEvent;

/// Bind parameters per inserted row
const COLUMNS_PER_ROW: usize = 4;
/// PostgreSQL accepts at most 65535 bind parameters per statement
const MAX_ROWS_PER_STATEMENT: usize = u16::MAX as usize / COLUMNS_PER_ROW;

/// SQLSTATE codes for failures that a replay of the same transaction may get past
const TRANSIENT_SQLSTATES: [&str; 3] = [
    "40P01", // deadlock_detected
    "40001", // serialization_failure
    "55P03", // lock_not_available
];

#[derive(Debug, Clone)]
pub struct PostgresRewardSink {
    pool: PgPool,
    table: String,
}

impl PostgresRewardSink {
    /// Connect a pool sized for the configured worker count
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            BatchError::configuration("database.url is required for the PostgreSQL sink")
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(url)
            .await
            .map_err(|e| classify_sqlx_error("connect", e))?;

        info!(
            max_connections = config.max_connections,
            table = %config.table,
            "🗄️ PostgreSQL reward sink connected"
        );

        Self::from_pool(pool, &config.table)
    }

    pub fn from_pool(pool: PgPool, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the reward table if it does not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                customer_id VARCHAR(64) NOT NULL,
                points INTEGER NOT NULL,
                tx_amount NUMERIC(19, 4) NOT NULL,
                tx_time TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT NOW()
            )",
            self.table
        );

        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| classify_sqlx_error("ensure_schema", e))?;

        debug!(table = %self.table, "Reward table schema ensured");
        Ok(())
    }
}

#[async_trait]
impl RewardSink for PostgresRewardSink {
    async fn write_batch(&self, events: &[RewardEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify_sqlx_error("begin", e))?;

        for rows in events.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut query: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (customer_id, points, tx_amount, tx_time) ",
                self.table
            ));
            query.push_values(rows, |mut row, event| {
                row.push_bind(&event.customer_id)
                    .push_bind(event.points)
                    .push_bind(&event.amount)
                    .push_bind(event.timestamp);
            });

            query
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| classify_sqlx_error("insert", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| classify_sqlx_error("commit", e))?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

/// Map a sqlx failure onto the batch error taxonomy
pub fn classify_sqlx_error(operation: &str, error: sqlx::Error) -> BatchError {
    match &error {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            BatchError::transient_store(operation, error.to_string())
        }
        sqlx::Error::Database(db_err) => {
            let transient = db_err
                .code()
                .is_some_and(|code| TRANSIENT_SQLSTATES.iter().any(|s| *s == code.as_ref()));
            if transient {
                BatchError::transient_store(operation, db_err.to_string())
            } else {
                BatchError::store(operation, db_err.to_string())
            }
        }
        _ => BatchError::store(operation, error.to_string()),
    }
}

/// Accept `name` or `schema.name` made of ASCII letters, digits and underscores
fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table.split('.').count() <= 2
        && table.split('.').all(|part| {
            !part.is_empty()
                && !part.starts_with(|c: char| c.is_ascii_digit())
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(())
    } else {
        Err(BatchError::configuration(format!(
            "invalid reward table name '{table}'"
        )))
    }
}
