//! Model configuration, sequence model and anomaly likelihood components

pub mod likelihood;
pub mod params;
pub mod sequence;

pub use likelihood::AnomalyLikelihood;
pub use params::{ConfigSearch, ModelConfig, ScalarTimeOfDaySearch, StatsConfigBuilder};
pub use sequence::{ModelFactory, SequenceModel, TransitionMemoryModel, TransitionModelFactory};
