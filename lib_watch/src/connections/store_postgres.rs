//! # PostgreSQL Warnings Store
//!
//! The production `WarningsStore`, backed by a `sqlx` connection pool.
//! Idempotence comes from the `UNIQUE` constraint on `event_id` combined
//! with `ON CONFLICT DO NOTHING RETURNING`: only rows that were genuinely
//! new come back, so the caller can enqueue exactly those.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{AcceptedWarning, StoreError, WarningRecord, WarningsStore};
use crate::enrich::Analysis;
use crate::flagging::FlaggedEvent;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS warnings (
    id                 BIGSERIAL PRIMARY KEY,
    event_id           TEXT NOT NULL UNIQUE,
    category           TEXT NOT NULL,
    event              JSONB NOT NULL,
    root_cause         TEXT[],
    impact             TEXT[],
    next_steps         TEXT[],
    has_been_processed BOOLEAN NOT NULL DEFAULT FALSE,
    created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATED_AT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS warnings_created_at_idx ON warnings (created_at DESC)";

const SELECT_COLUMNS: &str = "id, event_id, category, event, root_cause, impact, next_steps, \
                              has_been_processed, created_at";

/// A wrapper around the PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgWarningsStore {
    pool: PgPool,
}

impl PgWarningsStore {
    /// Creates a new connection pool for the specified database URL.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Creates the warnings table and its indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        sqlx::query(CREATED_AT_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    /// Checks the health of the database connection by running a simple query.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

impl WarningsStore for PgWarningsStore {
    async fn upsert_warnings(
        &self,
        batch: &[FlaggedEvent],
    ) -> Result<Vec<AcceptedWarning>, StoreError> {
        let mut accepted = Vec::new();
        let mut tx = self.pool.begin().await?;

        for flagged in batch {
            let event_json = serde_json::to_value(&flagged.event)?;
            let row: Option<(i64, String)> = sqlx::query_as(
                "INSERT INTO warnings (event_id, category, event) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (event_id) DO NOTHING \
                 RETURNING id, event_id",
            )
            .bind(&flagged.event.id)
            .bind(flagged.kind.label())
            .bind(event_json)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some((id, event_id)) = row {
                accepted.push(AcceptedWarning { id, event_id });
            }
        }

        tx.commit().await?;
        log::debug!(
            "upserted {} flagged events, {} newly accepted",
            batch.len(),
            accepted.len()
        );
        Ok(accepted)
    }

    async fn query_warnings(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<WarningRecord>, StoreError> {
        let records = match since {
            Some(since) => {
                sqlx::query_as::<_, WarningRecord>(&format!(
                    "SELECT {} FROM warnings WHERE created_at > $1 ORDER BY created_at DESC",
                    SELECT_COLUMNS
                ))
                .bind(since)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, WarningRecord>(&format!(
                    "SELECT {} FROM warnings ORDER BY created_at DESC",
                    SELECT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(records)
    }

    async fn mark_processed(
        &self,
        warning_id: i64,
        analysis: &Analysis,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE warnings \
             SET root_cause = $2, impact = $3, next_steps = $4, has_been_processed = TRUE \
             WHERE id = $1",
        )
        .bind(warning_id)
        .bind(&analysis.root_cause)
        .bind(&analysis.impact)
        .bind(&analysis.next_steps)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
