//! # Risk Rules
//!
//! The pure classifier at the heart of the monitor: one event in, at most one
//! warning category out. Rules are evaluated in a fixed order and the last
//! match wins, so a large push is reported as "large" rather than twice.
//!
//! The sampling rule (numeric ID divisible by a modulus forces a dummy
//! warning) exists to keep the downstream stream non-empty in quiet periods.
//! It is deliberately configurable: set `sampling_modulus` to `None` to turn
//! it off.

use std::fmt;

use super::event::RawEvent;

/// Commit count above which a default-branch push is escalated.
pub const DEFAULT_LARGE_PUSH_THRESHOLD: u64 = 100;
/// Default modulus for the sampling rule.
pub const DEFAULT_SAMPLING_MODULUS: u64 = 15;

/// Refs that count as a default branch for push events.
const DEFAULT_BRANCH_REFS: [&str; 2] = ["refs/heads/main", "refs/heads/master"];
/// Branch names that count as a default branch for delete events.
const DEFAULT_BRANCH_NAMES: [&str; 2] = ["main", "master"];

/// Tunables for the classifier. Pure data, safe to clone per cycle.
#[derive(Debug, Clone)]
pub struct FlagConfig {
    /// Commit count threshold for [`WarningKind::LargePushDefault`].
    pub large_push_threshold: u64,
    /// Modulus for the sampling rule; `None` disables it.
    pub sampling_modulus: Option<u64>,
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            large_push_threshold: DEFAULT_LARGE_PUSH_THRESHOLD,
            sampling_modulus: Some(DEFAULT_SAMPLING_MODULUS),
        }
    }
}

/// The closed set of warning categories the monitor can assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// A push landed on `main` or `master`.
    PushDefault,
    /// A push on a default branch carrying more commits than the threshold.
    LargePushDefault,
    /// A `main`/`master` branch was deleted.
    DefaultBranchDeleted,
    /// A repository switched from private to public.
    MadePublic,
    /// A collaborator was granted access.
    CollaboratorAdded,
    /// Synthetic warning emitted by the sampling rule.
    Dummy,
}

impl WarningKind {
    /// The human-readable category label, matching what subscribers and the
    /// warnings store see.
    pub fn label(&self) -> &'static str {
        match self {
            WarningKind::PushDefault => "Push to default branch",
            WarningKind::LargePushDefault => "Large push to default branch",
            WarningKind::DefaultBranchDeleted => "Default branch deleted",
            WarningKind::MadePublic => "Repository visibility changed to public",
            WarningKind::CollaboratorAdded => "New collaborator added",
            WarningKind::Dummy => "Dummy warning",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifies one event. Stateless, no I/O, total over any `RawEvent`.
///
/// Rule order (last match wins):
/// 1. push to a default branch,
/// 2. push to a default branch with `size` above the threshold,
/// 3. deletion of a default branch,
/// 4. repository made public,
/// 5. collaborator added,
/// 6. sampling rule, which overrides all of the above.
pub fn flag(event: &RawEvent, config: &FlagConfig) -> Option<WarningKind> {
    let mut matched = None;

    match event.kind.as_str() {
        "PushEvent" => {
            let is_default = event
                .payload_str("ref")
                .map(|r| DEFAULT_BRANCH_REFS.contains(&r))
                .unwrap_or(false);
            if is_default {
                matched = Some(WarningKind::PushDefault);
                let size = event.payload_u64("size").unwrap_or(0);
                if size > config.large_push_threshold {
                    matched = Some(WarningKind::LargePushDefault);
                }
            }
        }
        "DeleteEvent" => {
            let branch_deleted = event.payload_str("ref_type") == Some("branch")
                && event
                    .payload_str("ref")
                    .map(|r| DEFAULT_BRANCH_NAMES.contains(&r))
                    .unwrap_or(false);
            if branch_deleted {
                matched = Some(WarningKind::DefaultBranchDeleted);
            }
        }
        "PublicEvent" => {
            matched = Some(WarningKind::MadePublic);
        }
        "MemberEvent" => {
            if event.payload_str("action") == Some("added") {
                matched = Some(WarningKind::CollaboratorAdded);
            }
        }
        _ => {}
    }

    // Sampling rule last so it overrides any genuine match.
    if let Some(modulus) = config.sampling_modulus {
        if let Some(id) = event.numeric_id() {
            if modulus != 0 && id % modulus == 0 {
                matched = Some(WarningKind::Dummy);
            }
        }
    }

    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: &str, kind: &str, payload: serde_json::Value) -> RawEvent {
        serde_json::from_value(json!({
            "id": id,
            "type": kind,
            "payload": payload
        }))
        .unwrap()
    }

    // Sampling disabled so the genuine rules can be observed in isolation.
    fn no_sampling() -> FlagConfig {
        FlagConfig {
            sampling_modulus: None,
            ..FlagConfig::default()
        }
    }

    #[test]
    fn test_push_to_default_branch() {
        let e = event("101", "PushEvent", json!({"ref": "refs/heads/main", "size": 5}));
        assert_eq!(flag(&e, &no_sampling()), Some(WarningKind::PushDefault));
        // Deterministic: the same event always yields the same category.
        assert_eq!(flag(&e, &no_sampling()), Some(WarningKind::PushDefault));
    }

    #[test]
    fn test_large_push_overrides_plain_push() {
        let e = event(
            "101",
            "PushEvent",
            json!({"ref": "refs/heads/main", "size": 150}),
        );
        assert_eq!(flag(&e, &no_sampling()), Some(WarningKind::LargePushDefault));
    }

    #[test]
    fn test_push_to_feature_branch_not_flagged() {
        let e = event(
            "101",
            "PushEvent",
            json!({"ref": "refs/heads/feature/x", "size": 500}),
        );
        assert_eq!(flag(&e, &no_sampling()), None);
    }

    #[test]
    fn test_default_branch_deleted() {
        let e = event(
            "102",
            "DeleteEvent",
            json!({"ref_type": "branch", "ref": "master"}),
        );
        assert_eq!(
            flag(&e, &no_sampling()),
            Some(WarningKind::DefaultBranchDeleted)
        );

        // Tag deletion with a matching name must not fire.
        let e = event(
            "103",
            "DeleteEvent",
            json!({"ref_type": "tag", "ref": "main"}),
        );
        assert_eq!(flag(&e, &no_sampling()), None);
    }

    #[test]
    fn test_public_and_member_events() {
        let e = event("104", "PublicEvent", json!({}));
        assert_eq!(flag(&e, &no_sampling()), Some(WarningKind::MadePublic));

        let e = event("105", "MemberEvent", json!({"action": "added"}));
        assert_eq!(flag(&e, &no_sampling()), Some(WarningKind::CollaboratorAdded));

        let e = event("106", "MemberEvent", json!({"action": "removed"}));
        assert_eq!(flag(&e, &no_sampling()), None);
    }

    #[test]
    fn test_sampling_rule_fires_without_other_match() {
        // ID 30 is divisible by 15 and WatchEvent matches no genuine rule.
        let e = event("30", "WatchEvent", json!({"action": "started"}));
        assert_eq!(flag(&e, &FlagConfig::default()), Some(WarningKind::Dummy));
    }

    #[test]
    fn test_sampling_rule_overrides_genuine_match() {
        let e = event("45", "PublicEvent", json!({}));
        assert_eq!(flag(&e, &FlagConfig::default()), Some(WarningKind::Dummy));
    }

    #[test]
    fn test_sampling_rule_disabled() {
        let e = event("30", "WatchEvent", json!({"action": "started"}));
        assert_eq!(flag(&e, &no_sampling()), None);
    }

    #[test]
    fn test_non_numeric_id_skips_sampling() {
        let e = event("abc", "WatchEvent", json!({}));
        assert_eq!(flag(&e, &FlagConfig::default()), None);
    }
}
