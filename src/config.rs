//! Configuration management for the model runner

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment overrides, e.g. `MODEL_RUNNER__LOGGING__LEVEL=debug`.
const ENV_PREFIX: &str = "MODEL_RUNNER";

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub likelihood: LikelihoodConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Logging configuration
///
/// stdout and stderr carry the protocol, so log records only ever go to
/// `file`. Without a file, logging is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty, json)
    #[serde(default)]
    pub format: LogFormat,
    /// Log file path, appended to
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Anomaly likelihood estimator windows, all counted in records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LikelihoodConfig {
    /// Leading records excluded from the fit while the model is still learning
    pub learning_period: usize,
    /// Records after the learning period before the first fit
    pub estimation_samples: usize,
    /// Maximum number of (timestamp, value, score) triples kept
    pub historic_window_size: usize,
    /// Refit cadence
    pub reestimation_period: usize,
    /// Moving-average window applied to raw scores
    pub averaging_window: usize,
    /// Most recent averaged scores left out of every fit
    pub excluded_recent: usize,
}

impl Default for LikelihoodConfig {
    fn default() -> Self {
        Self {
            learning_period: 288,
            estimation_samples: 100,
            historic_window_size: 8640,
            reestimation_period: 100,
            averaging_window: 10,
            excluded_recent: 10,
        }
    }
}

impl LikelihoodConfig {
    /// Number of records answered with the neutral probability.
    pub fn probationary_period(&self) -> usize {
        self.learning_period + self.estimation_samples
    }
}

/// Parameters of the scalar-plus-time-of-day configuration search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Buckets the stats range is divided into when deriving the resolution
    pub num_buckets: f64,
    /// Resolution floor used when the stats carry no `minResolution`
    pub default_min_resolution: f64,
    /// Active bits per scalar value
    pub value_width: usize,
    /// Total bits of the scalar encoder
    pub value_size: usize,
    /// Bucket indexes are clamped to +/- half of this around the offset
    pub max_buckets: usize,
    /// Active bits per time-of-day value
    pub time_of_day_width: usize,
    /// Hours covered by one time-of-day encoding width
    pub time_of_day_radius: f64,
    pub initial_permanence: f64,
    pub permanence_increment: f64,
    /// Loss on synapses into an active bit from bits that were not active
    pub permanence_decrement: f64,
    /// Loss on synapses into a bit that was predicted but stayed inactive
    pub predicted_decrement: f64,
    pub connected_permanence: f64,
    /// Connected predecessors needed for a bit to count as predicted
    pub activation_threshold: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_buckets: 130.0,
            default_min_resolution: 0.001,
            value_width: 21,
            value_size: 400,
            max_buckets: 1000,
            time_of_day_width: 21,
            time_of_day_radius: 9.49,
            initial_permanence: 0.21,
            permanence_increment: 0.1,
            permanence_decrement: 0.1,
            predicted_decrement: 0.01,
            connected_permanence: 0.5,
            activation_threshold: 12,
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then an optional file, then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&AppConfig::default()).context("Failed to encode default configuration")?,
        );

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }

    /// Reject values the estimator or the model cannot work with.
    pub fn validate(&self) -> Result<()> {
        let likelihood = &self.likelihood;
        if likelihood.averaging_window == 0 {
            bail!("likelihood.averaging_window must be at least 1");
        }
        if likelihood.reestimation_period == 0 {
            bail!("likelihood.reestimation_period must be at least 1");
        }
        if likelihood.historic_window_size == 0 {
            bail!("likelihood.historic_window_size must be at least 1");
        }

        let search = &self.search;
        if !(search.num_buckets > 0.0) {
            bail!("search.num_buckets must be positive");
        }
        if !(search.default_min_resolution > 0.0) {
            bail!("search.default_min_resolution must be positive");
        }
        if search.value_width == 0 || search.value_width > search.value_size {
            bail!(
                "search.value_width must be in 1..={}, got {}",
                search.value_size,
                search.value_width
            );
        }
        if search.time_of_day_width == 0 || !(search.time_of_day_radius > 0.0) {
            bail!("search time-of-day width and radius must be positive");
        }
        if search.max_buckets < 2 {
            bail!("search.max_buckets must be at least 2");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, None);
        assert_eq!(config.likelihood.probationary_period(), 388);
        assert_eq!(config.search.num_buckets, 130.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.likelihood, LikelihoodConfig::default());
        assert_eq!(config.search, SearchConfig::default());
    }

    #[test]
    fn test_load_from_file_overrides_section() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[likelihood]\nlearning_period = 10\nestimation_samples = 5\n\n[logging]\nformat = \"json\""
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.likelihood.learning_period, 10);
        assert_eq!(config.likelihood.estimation_samples, 5);
        assert_eq!(config.likelihood.averaging_window, 10);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load_from_path("/nonexistent/model-runner.toml").is_err());
    }

    #[test]
    fn test_rejects_zero_averaging_window() {
        let mut config = AppConfig::default();
        config.likelihood.averaging_window = 0;
        assert!(config.validate().is_err());
    }
}
