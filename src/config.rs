//! Configuration management for replay-throttle.
//!
//! Settings come from an optional YAML file, overridden by environment
//! variables such as `REPLAY_THROTTLE__RATE_LIMITING__TIER=gold`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, ThrottleError};
use crate::ratelimit::{Tier, DEFAULT_INITIAL_BURST_ALLOWANCE};

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "REPLAY_THROTTLE";

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Whether calls are limited at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Subscription tier of the token holder
    #[serde(default)]
    pub tier: Tier,

    /// Start as if the quota had been in steady use for a full window
    #[serde(default)]
    pub safe_start: bool,

    /// Calls allowed to fire immediately after a safe start
    #[serde(default = "default_initial_burst_allowance")]
    pub initial_burst_allowance: u32,

    /// Path to a YAML tier definition that replaces the named tier
    #[serde(default)]
    pub tier_file: Option<PathBuf>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            tier: Tier::default(),
            safe_start: false,
            initial_burst_allowance: default_initial_burst_allowance(),
            tier_file: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_initial_burst_allowance() -> u32 {
    DEFAULT_INITIAL_BURST_ALLOWANCE
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ThrottleConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ThrottleError::Config(e.to_string()))
    }

    /// Load configuration from an optional file with environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| ThrottleError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Write;

    /// Serializes tests that read the process environment through `load`.
    static ENV_LOCK: Mutex<()> = parking_lot::const_mutex(());

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ThrottleConfig::default();
        assert!(config.rate_limiting.enabled);
        assert_eq!(config.rate_limiting.tier, Tier::Regular);
        assert!(!config.rate_limiting.safe_start);
        assert_eq!(config.rate_limiting.initial_burst_allowance, 1);
        assert!(config.rate_limiting.tier_file.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
rate_limiting:
  tier: diamond
  safe_start: true
"#;
        let config = ThrottleConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rate_limiting.tier, Tier::Diamond);
        assert!(config.rate_limiting.safe_start);
        assert!(config.rate_limiting.enabled);
        assert_eq!(config.rate_limiting.initial_burst_allowance, 1);
    }

    #[test]
    fn test_parse_none_tier_alias() {
        let yaml = r#"
rate_limiting:
  tier: none
  enabled: false
"#;
        let config = ThrottleConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rate_limiting.tier, Tier::Regular);
        assert!(!config.rate_limiting.enabled);
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = ThrottleConfig::from_yaml("rate_limiting:\n  tier: platinum\n");
        assert!(matches!(result, Err(ThrottleError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let _env = ENV_LOCK.lock();
        let file = write_config(
            "rate_limiting:\n  tier: grand_champion\n  initial_burst_allowance: 0\nlogging:\n  json: true",
        );

        let config = ThrottleConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.rate_limiting.tier, Tier::GrandChampion);
        assert_eq!(config.rate_limiting.initial_burst_allowance, 0);
        assert!(config.logging.json);
    }

    #[test]
    fn test_load_missing_file() {
        let _env = ENV_LOCK.lock();
        let result = ThrottleConfig::load(Some(Path::new("/nonexistent/replay-throttle.yaml")));
        assert!(matches!(result, Err(ThrottleError::Config(_))));
    }

    #[test]
    fn test_load_env_overrides_file() {
        let _env = ENV_LOCK.lock();
        let file = write_config(
            "rate_limiting:\n  tier: diamond\n  safe_start: false\n  initial_burst_allowance: 3",
        );

        std::env::set_var("REPLAY_THROTTLE__RATE_LIMITING__TIER", "gold");
        std::env::set_var("REPLAY_THROTTLE__RATE_LIMITING__SAFE_START", "true");
        let result = ThrottleConfig::load(Some(file.path()));
        std::env::remove_var("REPLAY_THROTTLE__RATE_LIMITING__TIER");
        std::env::remove_var("REPLAY_THROTTLE__RATE_LIMITING__SAFE_START");

        let config = result.unwrap();
        assert_eq!(config.rate_limiting.tier, Tier::Gold);
        assert!(config.rate_limiting.safe_start);
        // keys without an override keep the file value
        assert_eq!(config.rate_limiting.initial_burst_allowance, 3);
        assert!(config.rate_limiting.enabled);
    }
}
