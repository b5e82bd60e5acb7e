//! # Warning Enrichment
//!
//! Free-text analysis of a warning via an external chat-completions API,
//! degrading to a fixed placeholder whenever the call is unconfigured or
//! fails. Enrichment is best-effort by contract: it may be wrong or absent,
//! but it must never block or fail a delivery.

pub mod analyzer;

pub use analyzer::{Analysis, Analyzer, AnalyzerConfig};
