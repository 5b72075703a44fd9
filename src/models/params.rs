//! Model configuration synthesis from metric summary statistics

use crate::config::SearchConfig;
use crate::encoder::INPUT_RECORD_SCHEMA;
use crate::error::{Result, RunnerError};
use crate::types::stats::SummaryStats;
use serde::Serialize;
use tracing::debug;

/// Scalar value encoder parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalarEncoderParams {
    pub field_name: String,
    /// Value span covered by one bucket
    pub resolution: f64,
    /// Value mapped to bucket 0
    pub offset: f64,
    /// Active bits per value
    pub w: usize,
    /// Total bits
    pub n: usize,
    pub max_buckets: usize,
}

/// Periodic time-of-day encoder parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeOfDayEncoderParams {
    pub field_name: String,
    /// Active bits per time of day
    pub w: usize,
    /// Hours covered by `w` bits
    pub radius: f64,
}

/// Sequence memory learning parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryParams {
    pub initial_permanence: f64,
    pub permanence_increment: f64,
    pub permanence_decrement: f64,
    pub predicted_decrement: f64,
    pub connected_permanence: f64,
    pub activation_threshold: usize,
}

/// Encoder and memory parameters of one model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelParams {
    pub value_encoder: ScalarEncoderParams,
    pub time_of_day_encoder: TimeOfDayEncoderParams,
    pub memory: MemoryParams,
}

/// Arguments controlling inference on a configured model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceArgs {
    /// Field whose prediction error is reported as the raw anomaly score
    pub predicted_field: String,
    pub learning_enabled: bool,
}

/// Complete model configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    pub model_params: ModelParams,
    pub inference_args: InferenceArgs,
}

/// Source of candidate model configurations, best first.
pub trait ConfigSearch {
    fn candidates(&self, stats: &SummaryStats) -> Vec<ModelConfig>;
}

/// Parameter generator for a scalar metric with a time-of-day component.
#[derive(Debug, Clone, Default)]
pub struct ScalarTimeOfDaySearch {
    params: SearchConfig,
}

impl ScalarTimeOfDaySearch {
    pub fn new(params: SearchConfig) -> Self {
        Self { params }
    }

    /// Encoder resolution for the given range.
    pub fn resolution(&self, stats: &SummaryStats) -> f64 {
        let (min, max) = widened_range(stats);
        let min_resolution = stats
            .min_resolution
            .unwrap_or(self.params.default_min_resolution);
        min_resolution.max((max - min) / self.params.num_buckets)
    }
}

impl ConfigSearch for ScalarTimeOfDaySearch {
    fn candidates(&self, stats: &SummaryStats) -> Vec<ModelConfig> {
        let (min, max) = widened_range(stats);
        let [timestamp_field, value_field] = INPUT_RECORD_SCHEMA;
        let p = &self.params;

        let config = ModelConfig {
            model_params: ModelParams {
                value_encoder: ScalarEncoderParams {
                    field_name: value_field.name.to_string(),
                    resolution: self.resolution(stats),
                    offset: min + (max - min) / 2.0,
                    w: p.value_width,
                    n: p.value_size,
                    max_buckets: p.max_buckets,
                },
                time_of_day_encoder: TimeOfDayEncoderParams {
                    field_name: timestamp_field.name.to_string(),
                    w: p.time_of_day_width,
                    radius: p.time_of_day_radius,
                },
                memory: MemoryParams {
                    initial_permanence: p.initial_permanence,
                    permanence_increment: p.permanence_increment,
                    permanence_decrement: p.permanence_decrement,
                    predicted_decrement: p.predicted_decrement,
                    connected_permanence: p.connected_permanence,
                    activation_threshold: p.activation_threshold,
                },
            },
            inference_args: InferenceArgs {
                predicted_field: value_field.name.to_string(),
                learning_enabled: true,
            },
        };

        vec![config]
    }
}

/// A degenerate `min == max` range is widened to one unit.
fn widened_range(stats: &SummaryStats) -> (f64, f64) {
    if stats.min == stats.max {
        (stats.min, stats.min + 1.0)
    } else {
        (stats.min, stats.max)
    }
}

/// Derives exactly one model configuration from summary statistics.
pub struct StatsConfigBuilder<S = ScalarTimeOfDaySearch> {
    search: S,
}

impl StatsConfigBuilder<ScalarTimeOfDaySearch> {
    pub fn with_params(params: SearchConfig) -> Self {
        Self::new(ScalarTimeOfDaySearch::new(params))
    }
}

impl<S: ConfigSearch> StatsConfigBuilder<S> {
    pub fn new(search: S) -> Self {
        Self { search }
    }

    /// Build the model configuration, taking the first-ranked candidate.
    pub fn build(&self, stats: &SummaryStats) -> Result<ModelConfig> {
        stats.validate()?;

        let candidates = self.search.candidates(stats);
        debug!(candidates = candidates.len(), "Configuration search complete");

        candidates.into_iter().next().ok_or_else(|| {
            RunnerError::configuration(format!(
                "configuration search returned no candidate models for min={} max={}",
                stats.min, stats.max
            ))
        })
    }
}
