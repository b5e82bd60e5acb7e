//! # Event Flagging
//!
//! The data model for upstream feed events and the deterministic classifier
//! that decides which of them become warnings.

pub mod event;
pub mod rules;

pub use event::RawEvent;
pub use rules::{
    flag, FlagConfig, WarningKind, DEFAULT_LARGE_PUSH_THRESHOLD, DEFAULT_SAMPLING_MODULUS,
};

/// An event the classifier selected, paired with the category it matched.
///
/// A `RawEvent` maps to at most one category per poll cycle; when several
/// rules apply, the last one in the rule order wins (see [`rules::flag`]).
#[derive(Debug, Clone)]
pub struct FlaggedEvent {
    /// The upstream event, unmodified.
    pub event: RawEvent,
    /// The category assigned by the rule that matched last.
    pub kind: WarningKind,
}
