//! Error taxonomy for the model runner.
//!
//! Every variant is fatal: nothing in the pipeline retries. The engine formats
//! the first error it sees into an [`ErrorReport`](crate::types::ErrorReport)
//! and the process terminates.

use thiserror::Error;

/// Errors raised while configuring or running a model.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Invalid startup arguments, stats or configuration search result.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An input line that is not a `[timestamp, value]` numeric pair.
    #[error("Protocol error on input line {line}: {reason}")]
    Protocol { line: u64, reason: String },

    /// The sequence model failed while being built or while running a step.
    #[error("Model error: {0}")]
    Model(String),

    /// Numeric state inside the likelihood estimator became unusable.
    #[error("Estimation error: {0}")]
    Estimation(String),

    /// Reading from or writing to one of the stdio channels failed.
    #[error("I/O error on {channel}: {source}")]
    Io {
        channel: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        RunnerError::Configuration(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        RunnerError::Model(msg.into())
    }

    pub fn io(channel: &'static str, source: std::io::Error) -> Self {
        RunnerError::Io { channel, source }
    }
}

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
