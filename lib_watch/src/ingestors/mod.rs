//! # Feed Ingestion
//!
//! The write path of the monitor: the pagination walker that drains the feed
//! back to the previous horizon, and the self-scheduling poll cycle that ties
//! walking, flagging, persistence, and queueing together.

pub mod feed_polling;
pub mod feed_walk;

pub use feed_polling::{FeedPoller, PollError, PollerConfig};
pub use feed_walk::{walk, WalkOutcome};
