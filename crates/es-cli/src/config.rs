//! Engine configuration from TOML.

use std::fs;

use es_core::config::EngineConfig;

/// Environment variable naming a config file when `--config` is absent.
pub const CONFIG_ENV: &str = "EMBED_SHIELD_CONFIG";

pub fn parse_config(text: &str) -> Result<EngineConfig, String> {
    let config: EngineConfig = toml::from_str(text).map_err(|e| format!("Invalid config: {e}"))?;
    config.validate().map_err(|e| format!("Invalid config: {e}"))?;
    Ok(config)
}

/// Load from `path`, then `$EMBED_SHIELD_CONFIG`, then defaults.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig, String> {
    let path = match path {
        Some(path) => Some(path.to_string()),
        None => std::env::var(CONFIG_ENV).ok().filter(|p| !p.is_empty()),
    };
    match path {
        Some(path) => {
            log::debug!("loading config from {path}");
            let text = fs::read_to_string(&path).map_err(|e| format!("Failed to read '{path}': {e}"))?;
            parse_config(&text)
        }
        None => Ok(EngineConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = parse_config(
            r#"
self_origin = "https://app.example"
embed_hosts = ["player.example.org"]

[sweep]
interval_ms = 0
"#,
        )
        .unwrap();
        assert_eq!(config.self_origin, "https://app.example");
        assert_eq!(config.embed_hosts, vec!["player.example.org".to_string()]);
        assert_eq!(config.sweep.interval_ms, 0);
        assert_eq!(config.sweep.initial_ms, vec![500, 1000, 2000, 3000, 5000]);
        assert_eq!(config.response_cache_capacity, 256);
        assert!(config.immediate_activation);
    }

    #[test]
    fn invalid_origin_is_rejected() {
        let err = parse_config(r#"self_origin = "not an origin""#).unwrap_err();
        assert!(err.starts_with("Invalid config"));
    }

    #[test]
    fn explicit_path_must_exist() {
        assert!(load_config(Some("/nonexistent/embed-shield.toml")).is_err());
    }
}
