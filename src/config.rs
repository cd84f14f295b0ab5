//! Engine configuration, read from TOML.
//!
//! ```
//! use room_shuffle::config::EngineConfig;
//!
//! let config = EngineConfig::from_toml_str(r#"
//!     [server]
//!     bind = "0.0.0.0:9000"
//!
//!     [search]
//!     stall_iterations = 1000
//!     seed = 42
//! "#).unwrap();
//!
//! assert_eq!(config.server.bind, "0.0.0.0:9000");
//! assert_eq!(config.search.seed, Some(42));
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::anneal::SearchParams;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Allowed browser origin; `None` allows any.
    pub cors_origin: Option<String>,
    /// Used when an optimize request names no limit.
    pub default_time_limit_sec: u64,
    /// Requests asking for more are clamped to this.
    pub max_time_limit_sec: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "127.0.0.1:8000".to_string(),
            cors_origin: Some("http://localhost:5173".to_string()),
            default_time_limit_sec: 300,
            max_time_limit_sec: 3600,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub search: SearchParams,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let search = &self.search;
        if !(search.initial_temperature >= 0.0 && search.final_temperature >= 0.0) {
            return Err(ConfigError::Invalid("temperatures must be nonnegative".into()));
        }
        if !(0.0..=1.0).contains(&search.swap_ratio) {
            return Err(ConfigError::Invalid(format!("swap_ratio {} is outside [0, 1]", search.swap_ratio)));
        }
        if self.server.default_time_limit_sec > self.server.max_time_limit_sec {
            return Err(ConfigError::Invalid("default_time_limit_sec exceeds max_time_limit_sec".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_search_table_keeps_other_defaults() {
        let config = EngineConfig::from_toml_str("[search]\nswap_ratio = 0.25\n").unwrap();
        assert_eq!(config.search.swap_ratio, 0.25);
        assert_eq!(config.search.stall_iterations, SearchParams::default().stall_iterations);
    }

    #[test]
    fn rejects_out_of_range_swap_ratio() {
        let err = EngineConfig::from_toml_str("[search]\nswap_ratio = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(EngineConfig::load("/nonexistent/room-shuffle.toml"), Err(ConfigError::Io(_))));
    }
}
