//! # lib_watch
//!
//! Core library of the repowatch event monitor: feed retrieval, risk
//! flagging, the poll cycle, the bounded event log with per-subscriber
//! fan-out, and the durable-store collaborators. Modules are feature-gated
//! by folder so lean consumers can compile only what they use; the default
//! build enables everything.

// Declare the feature-gated modules
#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "connections")]
pub mod connections;
#[cfg(feature = "enrich")]
pub mod enrich;
#[cfg(feature = "flagging")]
pub mod flagging;
#[cfg(feature = "ingestors")]
pub mod ingestors;
#[cfg(feature = "queue")]
pub mod queue;
#[cfg(feature = "retrieve")]
pub mod retrieve;

// Re-export the working set
#[cfg(feature = "configs")]
pub use configs::{AppConfig, ConfigError};
#[cfg(feature = "connections")]
pub use connections::{
    AcceptedWarning, CursorError, CursorStore, PgWarningsStore, RedisCursor, StoreError,
    WarningRecord, WarningsStore,
};
#[cfg(feature = "enrich")]
pub use enrich::{Analysis, Analyzer, AnalyzerConfig};
#[cfg(feature = "flagging")]
pub use flagging::{flag, FlagConfig, FlaggedEvent, RawEvent, WarningKind};
#[cfg(feature = "ingestors")]
pub use ingestors::{walk, FeedPoller, PollError, PollerConfig, WalkOutcome};
#[cfg(feature = "queue")]
pub use queue::{Delivery, EventLog, QueueEntry, Subscription};
#[cfg(feature = "retrieve")]
pub use retrieve::{EventFeed, FeedClient, FeedError, FetchOutcome};
