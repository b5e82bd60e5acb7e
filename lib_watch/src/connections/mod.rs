//! # External Connections
//!
//! The durable collaborators of the pipeline, specified as traits so the
//! poll cycle can be driven by in-memory fakes in tests and by
//! Postgres/Redis in production. No global singletons: each implementation
//! is constructed once at startup and passed in explicitly.

pub mod cursor_redis;
pub mod store_postgres;

pub use cursor_redis::RedisCursor;
pub use store_postgres::PgWarningsStore;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::enrich::Analysis;
use crate::flagging::FlaggedEvent;

/// Errors from the warnings store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("warnings store unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the cursor store.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("cursor store unavailable: {0}")]
    Unavailable(String),
}

/// A warning row the store accepted during an upsert. Only rows that were
/// actually inserted are reported; replays of already-stored events are
/// silently absorbed, which is what makes re-processing after a crash safe.
#[derive(Debug, Clone)]
pub struct AcceptedWarning {
    /// Store-assigned warning ID.
    pub id: i64,
    /// The upstream event ID the row is keyed by.
    pub event_id: String,
}

/// A stored warning as returned by historical queries.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct WarningRecord {
    pub id: i64,
    pub event_id: String,
    pub category: String,
    pub event: serde_json::Value,
    pub root_cause: Option<Vec<String>>,
    pub impact: Option<Vec<String>>,
    pub next_steps: Option<Vec<String>>,
    pub has_been_processed: bool,
    pub created_at: DateTime<Utc>,
}

/// The durable warnings store. Upserts are idempotent by upstream event ID;
/// the overall delivery contract is at-least-once into this store.
#[allow(async_fn_in_trait)]
pub trait WarningsStore {
    /// Inserts a batch of flagged events, returning only the rows that were
    /// new. Re-inserting an already-stored event is a no-op.
    async fn upsert_warnings(
        &self,
        batch: &[FlaggedEvent],
    ) -> Result<Vec<AcceptedWarning>, StoreError>;

    /// Returns stored warnings ordered by recency, optionally restricted to
    /// those created after `since`.
    async fn query_warnings(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<WarningRecord>, StoreError>;

    /// Attaches an analysis to a warning and marks it processed.
    async fn mark_processed(&self, warning_id: i64, analysis: &Analysis)
        -> Result<(), StoreError>;
}

/// Persistence for the poll horizon: the ID of the newest event the cycle
/// orchestrator has fully processed. Read once at the start of each cycle,
/// written once at the end, surviving process restarts.
#[allow(async_fn_in_trait)]
pub trait CursorStore {
    async fn get_horizon(&self) -> Result<Option<String>, CursorError>;
    async fn set_horizon(&self, id: &str) -> Result<(), CursorError>;
}
