//! Online sequence model producing raw anomaly scores.
//!
//! The runner only sees the [`ModelFactory`] and [`SequenceModel`] traits.
//! [`TransitionMemoryModel`] is the built-in implementation: a first-order
//! sequence memory over sparse bit encodings of the scalar value and the time
//! of day. Each step it compares the value bits that became active with the
//! bits predicted from the previous step, then reinforces the transitions it
//! just observed.

use crate::encoder::EncodedRecord;
use crate::error::{Result, RunnerError};
use crate::models::params::{MemoryParams, ModelConfig, ScalarEncoderParams, TimeOfDayEncoderParams};
use chrono::{DateTime, Timelike, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// A stateful online predictor.
pub trait SequenceModel {
    /// Consume one record, learn from it and return its raw anomaly score in [0, 1].
    fn run_one_step(&mut self, record: &EncodedRecord) -> Result<f64>;
}

/// Builds a configured sequence model.
pub trait ModelFactory {
    fn create(&self, config: &ModelConfig) -> Result<Box<dyn SequenceModel>>;
}

/// Factory for [`TransitionMemoryModel`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionModelFactory;

impl ModelFactory for TransitionModelFactory {
    fn create(&self, config: &ModelConfig) -> Result<Box<dyn SequenceModel>> {
        Ok(Box::new(TransitionMemoryModel::new(config)?))
    }
}

/// Scalar encoder whose neighbouring buckets share all but one active bit.
#[derive(Debug, Clone)]
struct ScalarBucketEncoder {
    resolution: f64,
    offset: f64,
    w: usize,
    n: usize,
    half_range: i64,
}

impl ScalarBucketEncoder {
    fn new(params: &ScalarEncoderParams) -> Result<Self> {
        if !(params.resolution > 0.0) || !params.resolution.is_finite() {
            return Err(RunnerError::model(format!(
                "scalar encoder resolution must be positive, got {}",
                params.resolution
            )));
        }
        if params.w == 0 || params.w > params.n {
            return Err(RunnerError::model(format!(
                "scalar encoder needs 0 < w <= n, got w={} n={}",
                params.w, params.n
            )));
        }
        Ok(Self {
            resolution: params.resolution,
            offset: params.offset,
            w: params.w,
            n: params.n,
            half_range: (params.max_buckets / 2) as i64,
        })
    }

    fn bucket(&self, value: f64) -> i64 {
        let raw = ((value - self.offset) / self.resolution).round();
        let limit = self.half_range as f64;
        raw.clamp(-limit, limit) as i64
    }

    fn encode(&self, value: f64) -> Vec<u32> {
        let bucket = self.bucket(value);
        (0..self.w as i64)
            .map(|k| (mix(bucket.wrapping_add(k) as u64) % self.n as u64) as u32)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Periodic encoder of the hour of day; bits start at `bit_offset`.
#[derive(Debug, Clone)]
struct TimeOfDayEncoder {
    w: usize,
    n: usize,
    bit_offset: u32,
}

impl TimeOfDayEncoder {
    fn new(params: &TimeOfDayEncoderParams, bit_offset: usize) -> Result<Self> {
        if params.w == 0 || !(params.radius > 0.0) {
            return Err(RunnerError::model(format!(
                "time-of-day encoder needs positive w and radius, got w={} radius={}",
                params.w, params.radius
            )));
        }
        let n = ((params.w as f64) * 24.0 / params.radius).round() as usize;
        Ok(Self {
            w: params.w,
            n: n.max(params.w + 1),
            bit_offset: bit_offset as u32,
        })
    }

    fn encode(&self, timestamp: DateTime<Utc>) -> Vec<u32> {
        let hours = (timestamp.num_seconds_from_midnight() as f64
            + timestamp.nanosecond() as f64 / 1e9)
            / 3600.0;
        let center = ((hours / 24.0) * self.n as f64).floor() as usize % self.n;
        let mut bits: Vec<u32> = (0..self.w)
            .map(|k| self.bit_offset + ((center + k) % self.n) as u32)
            .collect();
        bits.sort_unstable();
        bits
    }
}

/// SplitMix64 finalizer, used to scatter bucket indexes over encoder bits.
fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// First-order sequence memory over encoded bits.
pub struct TransitionMemoryModel {
    value_encoder: ScalarBucketEncoder,
    time_of_day_encoder: TimeOfDayEncoder,
    memory: MemoryParams,
    predicted_field: String,
    learning_enabled: bool,
    /// Permanence of each (previous bit -> next bit) transition
    synapses: HashMap<u32, HashMap<u32, f64>>,
    prev_active: Vec<u32>,
    steps: u64,
}

impl TransitionMemoryModel {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let params = &config.model_params;
        if config.inference_args.predicted_field != params.value_encoder.field_name {
            return Err(RunnerError::model(format!(
                "predicted field {} has no scalar encoder (encoder field is {})",
                config.inference_args.predicted_field, params.value_encoder.field_name
            )));
        }

        let value_encoder = ScalarBucketEncoder::new(&params.value_encoder)?;
        let time_of_day_encoder =
            TimeOfDayEncoder::new(&params.time_of_day_encoder, params.value_encoder.n)?;

        info!(
            resolution = value_encoder.resolution,
            value_bits = value_encoder.n,
            time_of_day_bits = time_of_day_encoder.n,
            learning = config.inference_args.learning_enabled,
            "Sequence model created"
        );

        Ok(Self {
            value_encoder,
            time_of_day_encoder,
            memory: params.memory.clone(),
            predicted_field: config.inference_args.predicted_field.clone(),
            learning_enabled: config.inference_args.learning_enabled,
            synapses: HashMap::new(),
            prev_active: Vec::new(),
            steps: 0,
        })
    }

    /// Number of stored transitions.
    pub fn synapse_count(&self) -> usize {
        self.synapses.values().map(HashMap::len).sum()
    }

    /// Bits predicted to become active given the previous step.
    fn predict(&self) -> HashSet<u32> {
        let mut support: HashMap<u32, usize> = HashMap::new();
        for prev in &self.prev_active {
            let Some(targets) = self.synapses.get(prev) else {
                continue;
            };
            for (&next, &permanence) in targets {
                if permanence >= self.memory.connected_permanence {
                    *support.entry(next).or_insert(0) += 1;
                }
            }
        }

        support
            .into_iter()
            .filter(|&(_, count)| count >= self.memory.activation_threshold)
            .map(|(bit, _)| bit)
            .collect()
    }

    /// Update transitions from the previous step into this one.
    ///
    /// Synapses into an active bit are strengthened from bits that were
    /// active on the previous step and weakened from bits that were not.
    /// Synapses from previously active bits into a bit that was predicted but
    /// stayed inactive lose `predicted_decrement`, so alternating successors
    /// of the same bits all remain connected.
    fn learn(&mut self, active: &[u32], predicted: &HashSet<u32>) {
        let active_set: HashSet<u32> = active.iter().copied().collect();
        let prev_set: HashSet<u32> = self.prev_active.iter().copied().collect();
        let MemoryParams {
            initial_permanence,
            permanence_increment,
            permanence_decrement,
            predicted_decrement,
            ..
        } = self.memory;

        for (pre, targets) in self.synapses.iter_mut() {
            let pre_active = prev_set.contains(pre);
            targets.retain(|next, permanence| {
                if active_set.contains(next) {
                    if pre_active {
                        *permanence = (*permanence + permanence_increment).min(1.0);
                    } else {
                        *permanence -= permanence_decrement;
                    }
                } else if pre_active && predicted.contains(next) {
                    *permanence -= predicted_decrement;
                }
                *permanence > 0.0
            });
        }

        for prev in &self.prev_active {
            let targets = self.synapses.entry(*prev).or_default();
            for &next in active {
                targets.entry(next).or_insert(initial_permanence);
            }
        }
        self.synapses.retain(|_, targets| !targets.is_empty());
    }
}

impl SequenceModel for TransitionMemoryModel {
    fn run_one_step(&mut self, record: &EncodedRecord) -> Result<f64> {
        let value = record.float(&self.predicted_field).ok_or_else(|| {
            RunnerError::model(format!(
                "record has no numeric field {}",
                self.predicted_field
            ))
        })?;
        if !value.is_finite() {
            return Err(RunnerError::model(format!("non-finite value {value}")));
        }
        let timestamp = record
            .timestamp()
            .ok_or_else(|| RunnerError::model("record has no timestamp field"))?;

        let value_bits = self.value_encoder.encode(value);
        let predicted = self.predict();
        let unpredicted = value_bits
            .iter()
            .filter(|bit| !predicted.contains(*bit))
            .count();
        let score = unpredicted as f64 / value_bits.len() as f64;

        let mut active = value_bits;
        active.extend(self.time_of_day_encoder.encode(timestamp));

        if self.learning_enabled {
            self.learn(&active, &predicted);
        }
        self.prev_active = active;
        self.steps += 1;

        debug!(
            step = self.steps,
            value = value,
            predicted = predicted.len(),
            raw_score = score,
            "Model step complete"
        );

        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::encoder::RecordEncoder;
    use crate::models::params::StatsConfigBuilder;
    use crate::types::{InputRecord, SummaryStats};

    fn model_config() -> ModelConfig {
        StatsConfigBuilder::with_params(SearchConfig::default())
            .build(&SummaryStats::new(0.0, 100.0, None).unwrap())
            .unwrap()
    }

    fn step(model: &mut dyn SequenceModel, seconds: f64, value: f64) -> f64 {
        let record = InputRecord::from_epoch_seconds(seconds, value).unwrap();
        model
            .run_one_step(&RecordEncoder::new().encode(&record))
            .unwrap()
    }

    #[test]
    fn test_first_step_is_unpredicted() {
        let mut model = TransitionModelFactory.create(&model_config()).unwrap();
        assert_eq!(step(model.as_mut(), 0.0, 10.0), 1.0);
    }

    #[test]
    fn test_repeated_value_becomes_predicted() {
        let mut model = TransitionModelFactory.create(&model_config()).unwrap();
        let scores: Vec<f64> = (0..10)
            .map(|i| step(model.as_mut(), i as f64 * 60.0, 10.0))
            .collect();

        assert_eq!(scores[0], 1.0);
        assert_eq!(scores[9], 0.0);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_novel_value_scores_high() {
        let mut model = TransitionModelFactory.create(&model_config()).unwrap();
        for i in 0..10 {
            step(model.as_mut(), i as f64 * 60.0, 10.0);
        }
        let spike = step(model.as_mut(), 600.0, 90.0);
        assert!(spike > 0.75, "spike score {spike}");
    }

    #[test]
    fn test_alternating_neighbour_buckets_become_predicted() {
        let mut model = TransitionModelFactory.create(&model_config()).unwrap();
        let scores: Vec<f64> = (0..40)
            .map(|i| step(model.as_mut(), i as f64 * 60.0, 50.0 + 0.5 * (i % 2) as f64))
            .collect();

        assert!(scores[5] > 0.0);
        assert!(scores[12..].iter().all(|&s| s == 0.0), "scores {scores:?}");
    }

    #[test]
    fn test_neighbouring_buckets_overlap() {
        let config = model_config();
        let encoder = ScalarBucketEncoder::new(&config.model_params.value_encoder).unwrap();
        let a: HashSet<u32> = encoder.encode(10.0).into_iter().collect();
        let b: HashSet<u32> = encoder.encode(10.0 + encoder.resolution).into_iter().collect();
        assert!(a.intersection(&b).count() >= a.len() - 2);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = model_config();
        let encoder = ScalarBucketEncoder::new(&config.model_params.value_encoder).unwrap();
        assert_eq!(encoder.encode(1e12), encoder.encode(1e15));
    }

    #[test]
    fn test_time_of_day_wraps() {
        let config = model_config();
        let encoder = TimeOfDayEncoder::new(&config.model_params.time_of_day_encoder, 400).unwrap();
        let bits = encoder.encode(DateTime::from_timestamp(86_399, 0).unwrap());
        assert_eq!(bits.len(), encoder.w);
        assert!(bits.iter().all(|&b| b >= 400 && b < 400 + encoder.n as u32));
    }

    #[test]
    fn test_learning_disabled_keeps_memory_empty() {
        let mut config = model_config();
        config.inference_args.learning_enabled = false;
        let mut model = TransitionMemoryModel::new(&config).unwrap();
        for i in 0..5 {
            step(&mut model, i as f64 * 60.0, 10.0);
        }
        assert_eq!(model.synapse_count(), 0);
    }

    #[test]
    fn test_rejects_mismatched_predicted_field() {
        let mut config = model_config();
        config.inference_args.predicted_field = "c0".to_string();
        assert!(matches!(
            TransitionMemoryModel::new(&config),
            Err(RunnerError::Model(_))
        ));
    }

    #[test]
    fn test_rejects_zero_resolution() {
        let mut config = model_config();
        config.model_params.value_encoder.resolution = 0.0;
        assert!(TransitionModelFactory.create(&config).is_err());
    }
}
