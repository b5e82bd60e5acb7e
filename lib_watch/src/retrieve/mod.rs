//! # Upstream Retrieval
//!
//! HTTP access to the cursor-paginated events feed: conditional requests,
//! rate-limit backoff, and pagination metadata extraction.

pub mod feed_http;

pub use feed_http::{Backoff, EventFeed, FeedClient, FeedError, FetchOutcome, DEFAULT_POLL_INTERVAL};
