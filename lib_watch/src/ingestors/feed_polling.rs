//! # Feed Poll Cycle
//!
//! A self-scheduling polling ingestor in the same mold as a streaming
//! ingestor, but for a REST source that must be drained page by page. One
//! cycle loads the horizon, walks the feed, persists what was flagged,
//! enqueues exactly the newly accepted warnings, and advances the horizon.
//! The outer loop runs forever: a failed cycle is logged and retried after a
//! fallback interval, never escalated.
//!
//! Crash safety: the horizon is written only after the batch is durably
//! stored, and the store upsert is idempotent by event ID, so a cycle
//! interrupted between "fetched" and "horizon advanced" is safe to repeat.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::connections::{CursorError, CursorStore, StoreError, WarningsStore};
use crate::flagging::{FlagConfig, FlaggedEvent};
use crate::ingestors::feed_walk::walk;
use crate::queue::EventLog;
use crate::retrieve::{EventFeed, FeedError};

/// Default URL of the public events feed.
pub const DEFAULT_FEED_URL: &str = "https://api.github.com/events";
/// Sleep applied after a failed cycle.
pub const FALLBACK_INTERVAL: Duration = Duration::from_secs(60);
/// Upsert chunk size for large walks.
const BATCH_SIZE: usize = 1000;

/// Anything that can abort one poll cycle. The outer loop absorbs these.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cursor(#[from] CursorError),
}

/// Tunables for the poll cycle.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub feed_url: String,
    pub flag: FlagConfig,
    pub batch_size: usize,
    pub fallback_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            flag: FlagConfig::default(),
            batch_size: BATCH_SIZE,
            fallback_interval: FALLBACK_INTERVAL,
        }
    }
}

/// The cycle orchestrator. All collaborators are injected at construction;
/// the poller owns no global state.
pub struct FeedPoller<F, S, C> {
    feed: F,
    store: S,
    cursor: C,
    log: Arc<EventLog>,
    config: PollerConfig,
}

impl<F, S, C> FeedPoller<F, S, C>
where
    F: EventFeed,
    S: WarningsStore,
    C: CursorStore,
{
    pub fn new(feed: F, store: S, cursor: C, log: Arc<EventLog>, config: PollerConfig) -> Self {
        Self {
            feed,
            store,
            cursor,
            log,
            config,
        }
    }

    /// Runs one complete poll cycle and returns how long to sleep before the
    /// next one.
    pub async fn run_once(&self) -> Result<Duration, PollError> {
        let horizon = self.cursor.get_horizon().await?;
        let outcome = walk(
            &self.feed,
            &self.config.feed_url,
            horizon.as_deref(),
            &self.config.flag,
        )
        .await?;

        if !outcome.flagged.is_empty() {
            log::info!("poll cycle flagged {} event(s)", outcome.flagged.len());
            for chunk in outcome.flagged.chunks(self.config.batch_size) {
                let accepted = self.store.upsert_warnings(chunk).await?;
                let by_event_id: HashMap<&str, &FlaggedEvent> = chunk
                    .iter()
                    .map(|f| (f.event.id.as_str(), f))
                    .collect();
                // Enqueue only what the store actually accepted: replayed
                // events produce no queue entries, which is what keeps
                // re-processing idempotent end to end.
                for warning in accepted {
                    if let Some(flagged) = by_event_id.get(warning.event_id.as_str()) {
                        self.log.append(
                            warning.id,
                            flagged.kind.label().to_string(),
                            flagged.event.clone(),
                        );
                    }
                }
            }
        }

        if let Some(new_horizon) = &outcome.new_horizon {
            if advances(horizon.as_deref(), new_horizon) {
                self.cursor.set_horizon(new_horizon).await?;
            } else {
                log::warn!(
                    "walk produced horizon {} older than current {:?}; keeping current",
                    new_horizon,
                    horizon
                );
            }
        }

        Ok(outcome.poll_interval)
    }

    /// The outer loop: poll, sleep, repeat, forever. Cycle failures are
    /// logged and converted into the fallback sleep.
    pub async fn run(&self) {
        log::info!("feed poller started against {}", self.config.feed_url);
        loop {
            let delay = match self.run_once().await {
                Ok(interval) => interval,
                Err(e) => {
                    log::error!(
                        "poll cycle failed: {}; retrying in {}s",
                        e,
                        self.config.fallback_interval.as_secs()
                    );
                    self.config.fallback_interval
                }
            };
            tokio::time::sleep(delay).await;
        }
    }
}

/// The horizon only ever moves forward. IDs are compared numerically when
/// both sides parse; otherwise the newest observation wins, since the feed
/// is newest-first by contract.
fn advances(current: Option<&str>, candidate: &str) -> bool {
    match current {
        None => true,
        Some(current) => match (current.parse::<u64>(), candidate.parse::<u64>()) {
            (Ok(old), Ok(new)) => new >= old,
            _ => true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advances_from_empty_cursor() {
        assert!(advances(None, "100"));
    }

    #[test]
    fn test_advances_forward_only() {
        assert!(advances(Some("100"), "101"));
        assert!(advances(Some("100"), "100"));
        assert!(!advances(Some("100"), "99"));
    }

    #[test]
    fn test_advances_opaque_tokens() {
        // Unparsable tokens fall back to trusting the feed's ordering.
        assert!(advances(Some("opaque-a"), "opaque-b"));
    }
}
