//! # Queue & Fan-out
//!
//! The bounded in-memory event log shared by the write path (the poller) and
//! the read path (one subscription per streaming client), plus the
//! subscription type that tails it.

pub mod event_log;
pub mod fanout;

pub use event_log::{EventLog, QueueEntry, DEFAULT_QUEUE_CAPACITY};
pub use fanout::{Delivery, Subscription, DEFAULT_KEEPALIVE_TICK};
