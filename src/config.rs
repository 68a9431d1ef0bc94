//! Configuration management for ratetree.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::bandwidth::BandwidthFactory;
use crate::error::{RateTreeError, Result};
use crate::rate::Algorithm;

/// Prefix of environment variables overriding file settings.
pub const ENV_PREFIX: &str = "RATETREE";

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Algorithm for rates that do not name one
    pub default_algorithm: AlgorithmConfig,

    /// Stop evaluating leaves after the first chain that produced a success
    pub first_match_only: bool,

    /// How long a request may wait for permits, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Path to the limits file
    pub limits_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_algorithm: AlgorithmConfig::default(),
            first_match_only: false,
            default_timeout_ms: default_timeout_ms(),
            limits_path: None,
        }
    }
}

fn default_timeout_ms() -> u64 {
    0
}

/// Serialized form of [`Algorithm`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    AllOrNothing,
    Bursty {
        #[serde(default = "default_max_burst_seconds")]
        max_burst_seconds: f64,
    },
    WarmingUp {
        warmup_period_ms: u64,
        #[serde(default = "default_cold_factor")]
        cold_factor: f64,
    },
    Custom {
        name: String,
    },
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        AlgorithmConfig::Bursty {
            max_burst_seconds: default_max_burst_seconds(),
        }
    }
}

fn default_max_burst_seconds() -> f64 {
    1.0
}

fn default_cold_factor() -> f64 {
    3.0
}

impl AlgorithmConfig {
    pub fn to_algorithm(&self) -> Algorithm {
        match self {
            AlgorithmConfig::AllOrNothing => Algorithm::AllOrNothing,
            AlgorithmConfig::Bursty { max_burst_seconds } => Algorithm::Bursty {
                max_burst_seconds: *max_burst_seconds,
            },
            AlgorithmConfig::WarmingUp {
                warmup_period_ms,
                cold_factor,
            } => Algorithm::WarmingUp {
                warmup_period: Duration::from_millis(*warmup_period_ms),
                cold_factor: *cold_factor,
            },
            AlgorithmConfig::Custom { name } => Algorithm::Custom(name.clone()),
        }
    }
}

impl EngineConfig {
    /// Load configuration from an optional file, overridden by `RATETREE_*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading engine configuration");
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| RateTreeError::Config(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| RateTreeError::Config(e.to_string()))
    }

    /// Load configuration from a YAML file, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RateTreeError::Config(e.to_string()))
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Bandwidth factory using the configured default algorithm.
    pub fn bandwidth_factory(&self) -> Result<BandwidthFactory> {
        BandwidthFactory::new(self.default_algorithm.to_algorithm())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_algorithm, AlgorithmConfig::default());
        assert!(!config.first_match_only);
        assert_eq!(config.default_timeout(), Duration::ZERO);
        assert!(config.limits_path.is_none());

        let factory = config.bandwidth_factory().unwrap();
        assert_eq!(factory.default_algorithm(), &Algorithm::bursty());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
default_algorithm:
  type: warming_up
  warmup_period_ms: 2000
first_match_only: true
default_timeout_ms: 250
limits_path: /etc/ratetree/limits.yaml
"#;
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert!(config.first_match_only);
        assert_eq!(config.default_timeout(), Duration::from_millis(250));
        assert_eq!(config.limits_path.as_deref(), Some("/etc/ratetree/limits.yaml"));
        assert_eq!(
            config.default_algorithm.to_algorithm(),
            Algorithm::WarmingUp {
                warmup_period: Duration::from_secs(2),
                cold_factor: 3.0,
            }
        );
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = EngineConfig::from_yaml("first_match_only: true\n").unwrap();
        assert!(config.first_match_only);
        assert_eq!(config.default_timeout_ms, 0);
        assert_eq!(config.default_algorithm, AlgorithmConfig::default());
    }

    #[test]
    fn test_algorithm_variants() {
        let parse = |yaml: &str| serde_yaml::from_str::<AlgorithmConfig>(yaml).unwrap().to_algorithm();

        assert_eq!(parse("type: all_or_nothing"), Algorithm::AllOrNothing);
        assert_eq!(
            parse("type: bursty\nmax_burst_seconds: 5.0"),
            Algorithm::Bursty { max_burst_seconds: 5.0 }
        );
        assert_eq!(parse("type: bursty"), Algorithm::bursty());
        assert_eq!(
            parse("type: custom\nname: leaky"),
            Algorithm::Custom("leaky".to_string())
        );
        assert!(serde_yaml::from_str::<AlgorithmConfig>("type: sliding").is_err());
    }

    #[test]
    fn test_invalid_default_algorithm_rejected() {
        let config = EngineConfig::from_yaml(
            "default_algorithm:\n  type: warming_up\n  warmup_period_ms: 0\n",
        )
        .unwrap();
        assert!(matches!(
            config.bandwidth_factory(),
            Err(RateTreeError::InvalidRate(_))
        ));
    }

    #[test]
    fn test_load_file_with_env_override() {
        let path = std::env::temp_dir().join(format!("ratetree-engine-{}.yaml", std::process::id()));
        std::fs::write(&path, "first_match_only: true\ndefault_timeout_ms: 100\n").unwrap();
        std::env::set_var("RATETREE_DEFAULT_TIMEOUT_MS", "750");

        let loaded = EngineConfig::load(Some(&path));
        std::env::remove_var("RATETREE_DEFAULT_TIMEOUT_MS");
        std::fs::remove_file(&path).unwrap();

        let config = loaded.unwrap();
        assert!(config.first_match_only);
        assert_eq!(config.default_timeout_ms, 750);
    }

    #[test]
    fn test_from_file_missing() {
        assert!(matches!(
            EngineConfig::from_file("/nonexistent/ratetree.yaml"),
            Err(RateTreeError::Io(_))
        ));
    }
}
