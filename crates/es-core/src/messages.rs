//! Message protocol
//!
//! Messages exchanged between the interception layer, the hardening layer and
//! the hosting documents. Every payload is a JSON object tagged by `type`.
//! Anything that does not decode is `Unrecognized` and ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::telemetry::TelemetryEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Health check
    Ping,
    Pong,
    GetVersion,
    Version { version: String },
    /// Force a waiting interception layer active
    SkipWaiting,
    /// A request or script action was blocked
    RwBlocked(TelemetryEvent),
    /// The interception layer took control of the browsing context
    SwActivated { version: String },
    /// The hardening layer finished installing in an embedded document
    RwShieldReady,
    #[serde(skip)]
    Unrecognized,
}

impl Message {
    /// Decode an arbitrary payload. The bare string `"PING"` is accepted for
    /// older pages.
    pub fn decode(value: &Value) -> Self {
        match value {
            Value::String(s) if s == "PING" => Self::Ping,
            Value::Object(_) => Self::deserialize(value).unwrap_or(Self::Unrecognized),
            _ => Self::Unrecognized,
        }
    }

    /// Decode raw JSON text.
    pub fn decode_str(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::decode(&value),
            // Bare tokens arrive unquoted from some hosts.
            Err(_) if text.trim() == "PING" => Self::Ping,
            Err(_) => Self::Unrecognized,
        }
    }

    /// Encode for posting. `Unrecognized` has no wire form.
    pub fn encode(&self) -> Option<Value> {
        if matches!(self, Self::Unrecognized) {
            return None;
        }
        serde_json::to_value(self).ok()
    }

    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Self::Unrecognized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockCategory;
    use serde_json::json;

    #[test]
    fn decodes_tagged_messages() {
        assert_eq!(Message::decode(&json!({"type": "PING"})), Message::Ping);
        assert_eq!(Message::decode(&json!({"type": "SKIP_WAITING"})), Message::SkipWaiting);
        assert_eq!(Message::decode(&json!({"type": "GET_VERSION"})), Message::GetVersion);
        assert_eq!(Message::decode(&json!({"type": "RW_SHIELD_READY"})), Message::RwShieldReady);
    }

    #[test]
    fn legacy_ping_string() {
        assert_eq!(Message::decode(&json!("PING")), Message::Ping);
        assert_eq!(Message::decode_str("PING"), Message::Ping);
        assert_eq!(Message::decode_str("\"PING\""), Message::Ping);
    }

    #[test]
    fn unknown_payloads_are_ignored() {
        assert!(Message::decode(&json!({"type": "NAVIGATE", "url": "https://ad.example"})).is_unrecognized());
        assert!(Message::decode(&json!({"kind": "PING"})).is_unrecognized());
        assert!(Message::decode(&json!(42)).is_unrecognized());
        assert!(Message::decode(&json!({"type": "VERSION"})).is_unrecognized());
        assert!(Message::decode_str("{not json").is_unrecognized());
    }

    #[test]
    fn blocked_wire_shape() {
        let msg = Message::RwBlocked(TelemetryEvent {
            category: BlockCategory::Navigation,
            hostname: "vidsrc.cc".to_string(),
        });
        assert_eq!(
            msg.encode().unwrap(),
            json!({"type": "RW_BLOCKED", "category": "navigation", "hostname": "vidsrc.cc"})
        );
        assert_eq!(Message::decode(&msg.encode().unwrap()), msg);
    }

    #[test]
    fn unrecognized_has_no_wire_form() {
        assert!(Message::Unrecognized.encode().is_none());
    }
}
