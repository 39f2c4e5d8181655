//! Engine configuration
//!
//! Every field has a default, so a partial document (or none at all) yields a
//! working engine. The CLI reads TOML, the wasm bindings read JSON; both land
//! in the same serde model.

use serde::{Deserialize, Serialize};

use crate::rules::RuleError;
use crate::telemetry::DEFAULT_DETAIL_CHARS;
use crate::url::canonical_origin;

/// Error type for configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid self origin: '{0}'")]
    InvalidOrigin(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
    #[error(transparent)]
    Rules(#[from] RuleError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// The application's own origin. Top-level documents never leave it.
    pub self_origin: String,
    /// Embed hosts supplied by the wrapper-page generator, added to the
    /// builtin allowlist.
    pub embed_hosts: Vec<String>,
    /// Characters of hostname/URL kept in telemetry events.
    pub telemetry_detail_chars: usize,
    /// Entries kept in the substitute-response cache.
    pub response_cache_capacity: usize,
    /// Take control of the browsing context as soon as installed.
    pub immediate_activation: bool,
    pub overlay: OverlayConfig,
    pub sweep: SweepConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            self_origin: "http://localhost".to_string(),
            embed_hosts: Vec::new(),
            telemetry_detail_chars: DEFAULT_DETAIL_CHARS,
            response_cache_capacity: 256,
            immediate_activation: true,
            overlay: OverlayConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

/// Thresholds of the ad-overlay heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Smallest z-index considered an overlay.
    pub min_z_index: i64,
    /// Fraction of the viewport width or height an overlay must exceed.
    pub min_viewport_fraction: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            min_z_index: 1000,
            min_viewport_fraction: 0.25,
        }
    }
}

/// Fallback DOM sweep cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// One-shot sweeps, in milliseconds after installation.
    pub initial_ms: Vec<u32>,
    /// Steady cadence once the one-shot sweeps are done. Zero disables it.
    pub interval_ms: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            initial_ms: vec![500, 1000, 2000, 3000, 5000],
            interval_ms: 5000,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document served from `host_origin`. A document that
    /// omits `self_origin` gets the host's origin instead of the default;
    /// blank text is an empty document.
    pub fn from_json_in(text: &str, host_origin: Option<&str>) -> Result<Self, ConfigError> {
        let mut value = if text.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        if let (Some(fields), Some(origin)) = (value.as_object_mut(), host_origin) {
            fields
                .entry("self_origin")
                .or_insert_with(|| serde_json::Value::String(origin.to_string()));
        }
        let config: Self = serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Config for a given origin with everything else defaulted.
    pub fn for_origin(self_origin: &str) -> Self {
        Self {
            self_origin: self_origin.to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if canonical_origin(&self.self_origin).is_none() {
            return Err(ConfigError::InvalidOrigin(self.self_origin.clone()));
        }
        if self.response_cache_capacity == 0 {
            return Err(ConfigError::Invalid("response_cache_capacity must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.overlay.min_viewport_fraction) {
            return Err(ConfigError::Invalid(format!(
                "overlay.min_viewport_fraction {} is outside 0..=1",
                self.overlay.min_viewport_fraction
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert!(config.immediate_activation);
        assert_eq!(config.sweep.initial_ms, vec![500, 1000, 2000, 3000, 5000]);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = EngineConfig::from_json(r#"{"self_origin":"https://app.example","overlay":{"min_z_index":500}}"#)
            .unwrap();
        assert_eq!(config.self_origin, "https://app.example");
        assert_eq!(config.overlay.min_z_index, 500);
        assert_eq!(config.overlay.min_viewport_fraction, 0.25);
        assert_eq!(config.response_cache_capacity, 256);
    }

    #[test]
    fn missing_origin_comes_from_host() {
        let host = Some("https://app.example");
        assert_eq!(EngineConfig::from_json_in("", host).unwrap().self_origin, "https://app.example");

        let config = EngineConfig::from_json_in(r#"{"embed_hosts":["player.example.tv"]}"#, host).unwrap();
        assert_eq!(config.self_origin, "https://app.example");
        assert_eq!(config.embed_hosts, vec!["player.example.tv".to_string()]);

        let explicit = EngineConfig::from_json_in(r#"{"self_origin":"https://other.example"}"#, host).unwrap();
        assert_eq!(explicit.self_origin, "https://other.example");

        assert_eq!(EngineConfig::from_json_in("{}", None).unwrap().self_origin, "http://localhost");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"self_origin":"nowhere"}"#),
            Err(ConfigError::InvalidOrigin(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"response_cache_capacity":0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(EngineConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }
}
