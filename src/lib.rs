//! Anomaly Model Runner Library
//!
//! Runs a single streaming anomaly model: metric samples arrive as
//! newline-delimited JSON on an input channel, pass through an online sequence
//! model and an anomaly likelihood estimator, and leave as calibrated anomaly
//! probabilities on an output channel.

pub mod config;
pub mod consumer;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod runner;
pub mod types;

pub use config::AppConfig;
pub use encoder::RecordEncoder;
pub use engine::{EngineState, StreamProtocolEngine};
pub use error::{Result, RunnerError};
pub use models::likelihood::AnomalyLikelihood;
pub use models::params::{ModelConfig, StatsConfigBuilder};
pub use models::sequence::{ModelFactory, SequenceModel, TransitionModelFactory};
pub use runner::ModelRunner;
pub use types::{ErrorReport, InputRecord, OutputResult, SummaryStats};

/// Exit status of a run that ended in an error report
pub const FATAL_EXIT_CODE: i32 = 1;
