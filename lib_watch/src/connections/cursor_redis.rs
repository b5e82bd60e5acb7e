//! # Redis Cursor Store
//!
//! Keeps the poll horizon in Redis under a fixed key, so a restarted process
//! resumes exactly where the previous one stopped. The connection manager
//! reconnects on its own; each operation clones the managed handle, which is
//! cheap by design.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{CursorError, CursorStore};

/// Redis key holding the ID of the last fully processed event.
pub const HORIZON_KEY: &str = "last_processed_event_id";

/// A handler for the Redis-backed horizon cursor.
pub struct RedisCursor {
    conn: ConnectionManager,
}

impl RedisCursor {
    /// Connects to the Redis instance at `url` (e.g. "redis://127.0.0.1/").
    pub async fn connect(url: &str) -> Result<Self, CursorError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Verifies the connection by reading the horizon key.
    pub async fn ping(&self) -> Result<(), CursorError> {
        let mut conn = self.conn.clone();
        let _: Option<String> = conn.get(HORIZON_KEY).await?;
        Ok(())
    }
}

impl CursorStore for RedisCursor {
    async fn get_horizon(&self) -> Result<Option<String>, CursorError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(HORIZON_KEY).await?;
        Ok(value)
    }

    async fn set_horizon(&self, id: &str) -> Result<(), CursorError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(HORIZON_KEY, id).await?;
        Ok(())
    }
}
