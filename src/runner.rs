//! Model lifecycle: one-time setup and the per-record scoring step

use crate::config::{AppConfig, LikelihoodConfig};
use crate::encoder::RecordEncoder;
use crate::error::{Result, RunnerError};
use crate::models::likelihood::AnomalyLikelihood;
use crate::models::params::{ModelConfig, StatsConfigBuilder};
use crate::models::sequence::{ModelFactory, SequenceModel};
use crate::types::record::InputRecord;
use crate::types::stats::SummaryStats;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Owns the sequence model and the likelihood estimator of one model instance.
pub struct ModelRunner {
    model_id: String,
    encoder: RecordEncoder,
    model: Box<dyn SequenceModel>,
    likelihood: AnomalyLikelihood,
    last_timestamp: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for ModelRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRunner")
            .field("model_id", &self.model_id)
            .field("iteration", &self.likelihood.iteration())
            .field("history", &self.likelihood.history_len())
            .finish_non_exhaustive()
    }
}

impl ModelRunner {
    /// Derive the model configuration from `stats` and build model and estimator.
    pub fn new(
        model_id: &str,
        stats: &SummaryStats,
        config: &AppConfig,
        factory: &dyn ModelFactory,
    ) -> Result<Self> {
        let model_config = StatsConfigBuilder::with_params(config.search.clone()).build(stats)?;
        Self::from_model_config(model_id, &model_config, config.likelihood.clone(), factory)
    }

    /// Build model and estimator from an already derived configuration.
    pub fn from_model_config(
        model_id: &str,
        model_config: &ModelConfig,
        likelihood: LikelihoodConfig,
        factory: &dyn ModelFactory,
    ) -> Result<Self> {
        debug!(
            model = %model_id,
            config = %serde_json::to_string(model_config).unwrap_or_default(),
            "Creating model"
        );

        let model = factory.create(model_config)?;
        let encoder = RecordEncoder::new();

        info!(
            model = %model_id,
            fields = ?encoder.field_names(),
            resolution = model_config.model_params.value_encoder.resolution,
            probation = likelihood.probationary_period(),
            "Model runner initialized"
        );

        Ok(Self {
            model_id: model_id.to_string(),
            encoder,
            model,
            likelihood: AnomalyLikelihood::new(likelihood),
            last_timestamp: None,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Run one record through the model and the estimator.
    pub fn compute_anomaly_probability(&mut self, record: &InputRecord) -> Result<f64> {
        if let Some(last) = self.last_timestamp {
            if record.timestamp < last {
                warn!(
                    model = %self.model_id,
                    timestamp = %record.timestamp,
                    previous = %last,
                    "Input timestamp went backwards"
                );
            }
        }
        self.last_timestamp = Some(record.timestamp);

        let encoded = self.encoder.encode(record);
        let raw_score = self.model.run_one_step(&encoded)?;
        if !(0.0..=1.0).contains(&raw_score) {
            return Err(RunnerError::model(format!(
                "raw anomaly score {raw_score} outside [0, 1]"
            )));
        }

        let probability = self
            .likelihood
            .update(record.value, raw_score, record.timestamp)?;

        debug!(
            model = %self.model_id,
            raw_score = raw_score,
            probability = probability,
            log_likelihood = AnomalyLikelihood::log_likelihood(probability),
            "Record scored"
        );

        Ok(probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncodedRecord;
    use crate::models::sequence::TransitionModelFactory;

    struct FixedScore(f64);

    impl SequenceModel for FixedScore {
        fn run_one_step(&mut self, _record: &EncodedRecord) -> Result<f64> {
            Ok(self.0)
        }
    }

    struct FixedFactory(f64);

    impl ModelFactory for FixedFactory {
        fn create(&self, _config: &ModelConfig) -> Result<Box<dyn SequenceModel>> {
            Ok(Box::new(FixedScore(self.0)))
        }
    }

    struct FailingFactory;

    impl ModelFactory for FailingFactory {
        fn create(&self, _config: &ModelConfig) -> Result<Box<dyn SequenceModel>> {
            Err(RunnerError::model("no backend"))
        }
    }

    fn stats() -> SummaryStats {
        SummaryStats::new(0.0, 100.0, None).unwrap()
    }

    fn record(seconds: f64, value: f64) -> InputRecord {
        InputRecord::from_epoch_seconds(seconds, value).unwrap()
    }

    #[test]
    fn test_first_record_is_neutral() {
        let mut runner =
            ModelRunner::new("m1", &stats(), &AppConfig::default(), &TransitionModelFactory)
                .unwrap();
        assert_eq!(runner.compute_anomaly_probability(&record(0.0, 10.0)).unwrap(), 0.5);
        assert_eq!(runner.model_id(), "m1");
    }

    #[test]
    fn test_out_of_range_raw_score_is_model_error() {
        let mut runner =
            ModelRunner::new("m1", &stats(), &AppConfig::default(), &FixedFactory(1.5)).unwrap();
        assert!(matches!(
            runner.compute_anomaly_probability(&record(0.0, 1.0)),
            Err(RunnerError::Model(_))
        ));
    }

    #[test]
    fn test_factory_failure_propagates() {
        let err = ModelRunner::new("m1", &stats(), &AppConfig::default(), &FailingFactory)
            .unwrap_err();
        assert!(matches!(err, RunnerError::Model(_)));
    }

    #[test]
    fn test_debug_shows_progress() {
        let mut runner =
            ModelRunner::new("m1", &stats(), &AppConfig::default(), &FixedFactory(0.0)).unwrap();
        for i in 0..3 {
            runner.compute_anomaly_probability(&record(i as f64 * 60.0, 1.0)).unwrap();
        }
        let debug = format!("{runner:?}");
        assert!(debug.contains("iteration: 3"), "{debug}");
        assert!(debug.contains("history: 3"), "{debug}");
    }

    #[test]
    fn test_timestamp_regression_is_tolerated() {
        let mut runner =
            ModelRunner::new("m1", &stats(), &AppConfig::default(), &FixedFactory(0.0)).unwrap();
        runner.compute_anomaly_probability(&record(120.0, 1.0)).unwrap();
        assert!(runner.compute_anomaly_probability(&record(60.0, 1.0)).is_ok());
    }
}
