//! Confirmation/safety gate (§4.8): a single pending-confirmation slot per
//! conversation guarding hazardous tool calls behind an exact spoken phrase.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Cancel tokens recognized in place of the confirmation phrase.
const CANCEL_TOKENS: &[&str] = &["cancel", "abort", "no", "stop"];

/// A hazardous tool call awaiting the user's confirmation phrase before it
/// actually executes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PendingConfirmation {
    /// The tool the agent attempted to call.
    pub tool: String,
    /// The arguments it was about to call it with.
    pub args: Value,
    /// The exact phrase (case/whitespace-insensitive) that unlocks execution.
    pub required_phrase: String,
    /// Coarse category of hazard, surfaced to the caller for UI treatment.
    pub hazard_class: String,
    /// Human-readable reason the tool was held back.
    pub reason: String,
    /// When this confirmation slot silently expires.
    pub expires_at: DateTime<Utc>,
}

impl PendingConfirmation {
    /// Build a pending confirmation for `tool` invoked with `args`, expiring
    /// `ttl` from now.
    pub fn new(tool: &str, args: Value, ttl: chrono::Duration, now: DateTime<Utc>) -> Self {
        let required_phrase = build_phrase(tool, &args);
        Self {
            tool: tool.to_string(),
            args,
            hazard_class: hazard_class(tool).to_string(),
            reason: format!("{tool} requires explicit confirmation before executing"),
            required_phrase,
            expires_at: now + ttl,
        }
    }

    /// Whether this slot has expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Known hazard verbs for the tools the registry currently flags
/// `requires_confirmation`. Any other hazardous tool falls back to its
/// last dotted segment with underscores turned to spaces.
fn verb_for(tool: &str) -> String {
    match tool {
        "lock.unlock" => "unlock".to_string(),
        "power.enable" => "power on".to_string(),
        other => other
            .rsplit('.')
            .next()
            .unwrap_or(other)
            .replace('_', " "),
    }
}

/// Coarse hazard category, surfaced to the caller alongside the phrase.
fn hazard_class(tool: &str) -> &'static str {
    match tool {
        "lock.unlock" => "physical_access",
        "power.enable" => "electrical",
        _ => "general",
    }
}

/// Best-effort target extraction from the tool's arguments: prefers
/// `entity_id`, then `device`, then `target`, else a generic fallback.
fn target_for(args: &Value) -> String {
    for key in ["entity_id", "device", "target", "device_id"] {
        if let Some(value) = args.get(key).and_then(Value::as_str) {
            return value.to_string();
        }
    }
    "this device".to_string()
}

/// Build the exact confirmation phrase for a tool call: `"confirm <verb>
/// <target>"`, e.g. `lock.unlock` against `{"entity_id": "welding bay"}` →
/// `"confirm unlock welding bay"`.
fn build_phrase(tool: &str, args: &Value) -> String {
    format!("confirm {} {}", verb_for(tool), target_for(args))
}

/// Lowercase, whitespace-collapsed, trimmed form used for all phrase and
/// cancel-token comparisons.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether `reply` (after normalization) exactly matches `required_phrase`.
pub fn matches_phrase(required_phrase: &str, reply: &str) -> bool {
    normalize(required_phrase) == normalize(reply)
}

/// Whether `reply` is one of the recognized cancel tokens.
pub fn is_cancel_token(reply: &str) -> bool {
    let normalized = normalize(reply);
    CANCEL_TOKENS.contains(&normalized.as_str())
}

/// The exact cancellation message shown to the user (§8 scenario 4).
pub fn cancellation_message(tool: &str) -> String {
    format!("Action cancelled: {tool} was not executed.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_exact_seed_scenario_phrase() {
        let pending = PendingConfirmation::new(
            "lock.unlock",
            json!({"entity_id": "welding bay"}),
            chrono::Duration::seconds(300),
            Utc::now(),
        );
        assert_eq!(pending.required_phrase, "confirm unlock welding bay");
        assert_eq!(pending.hazard_class, "physical_access");
    }

    #[test]
    fn phrase_matching_is_case_and_whitespace_insensitive() {
        let required = "confirm unlock welding bay";
        assert!(matches_phrase(required, "Confirm   Unlock Welding Bay"));
        assert!(matches_phrase(required, "  confirm unlock welding bay  "));
        assert!(!matches_phrase(required, "confirm unlock the bay"));
    }

    #[test]
    fn recognizes_cancel_tokens() {
        for token in ["cancel", "Abort", " NO ", "stop"] {
            assert!(is_cancel_token(token));
        }
        assert!(!is_cancel_token("confirm unlock welding bay"));
    }

    #[test]
    fn cancellation_message_matches_seed_scenario() {
        assert_eq!(
            cancellation_message("lock.unlock"),
            "Action cancelled: lock.unlock was not executed."
        );
    }

    #[test]
    fn expiry_is_exclusive_of_the_boundary() {
        let now = Utc::now();
        let pending =
            PendingConfirmation::new("power.enable", json!({}), chrono::Duration::seconds(10), now);
        assert!(!pending.is_expired(now));
        assert!(pending.is_expired(now + chrono::Duration::seconds(10)));
    }

    #[test]
    fn falls_back_to_generic_target_when_absent() {
        let pending = PendingConfirmation::new(
            "power.enable",
            json!({}),
            chrono::Duration::seconds(300),
            Utc::now(),
        );
        assert_eq!(pending.required_phrase, "confirm power on this device");
    }
}
