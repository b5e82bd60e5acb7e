//! # Upstream Event Model
//!
//! A strongly-typed-at-the-edges representation of one event from the GitHub
//! public events feed. The envelope fields (`id`, `type`, the actor/repo/org
//! sub-objects) are stable across event types, while `payload` varies per
//! type and is kept as a raw `serde_json::Value` with accessor helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event as returned by the upstream feed, immutable once fetched.
///
/// Event IDs are opaque tokens: they happen to be decimal and increasing, but
/// the only place the numeric form is relied on is the sampling rule and the
/// horizon-regression guard. Everything else compares IDs as strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    /// The globally unique event ID assigned by the feed.
    pub id: String,
    /// The event type, an open set of strings (e.g. "PushEvent").
    #[serde(rename = "type")]
    pub kind: String,
    /// The type-specific payload. Schema varies per `kind`.
    #[serde(default)]
    pub payload: Value,
    /// The acting user, if the feed provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Value>,
    /// The repository the event happened in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<Value>,
    /// The owning organization, present only for org-scoped events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<Value>,
    /// Upstream creation timestamp (RFC 3339), if provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl RawEvent {
    /// The event ID parsed as an integer, or `None` when the token does not
    /// fit. Used by the sampling rule and the horizon monotonicity guard.
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.parse().ok()
    }

    /// A string field from the payload, if present and a string.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// An unsigned integer field from the payload.
    pub fn payload_u64(&self, key: &str) -> Option<u64> {
        self.payload.get(key).and_then(Value::as_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_minimal_event() {
        // The feed omits org (and sometimes actor) for many events; those
        // fields must default rather than fail the whole element.
        let event: RawEvent = serde_json::from_value(json!({
            "id": "44211580093",
            "type": "WatchEvent",
            "payload": {"action": "started"}
        }))
        .unwrap();

        assert_eq!(event.id, "44211580093");
        assert_eq!(event.kind, "WatchEvent");
        assert_eq!(event.payload_str("action"), Some("started"));
        assert!(event.org.is_none());
    }

    #[test]
    fn test_numeric_id_parses_and_rejects() {
        let mut event: RawEvent = serde_json::from_value(json!({
            "id": "30",
            "type": "PushEvent"
        }))
        .unwrap();
        assert_eq!(event.numeric_id(), Some(30));

        event.id = "not-a-number".to_string();
        assert_eq!(event.numeric_id(), None);
    }
}
