//! Stream protocol engine.
//!
//! Drives one model instance through its lifecycle:
//!
//! ```text
//! Idle -> Initializing -> Running -> Closed
//!              \             \
//!               +-------------+---> Failed
//! ```
//!
//! While running, every input line is decoded, scored and answered with one
//! flushed output line before the next line is read. The first error of any
//! kind moves the engine to `Failed` and writes exactly one error report.

use crate::consumer::InputReader;
use crate::error::{Result, RunnerError};
use crate::metrics::{RunMetrics, RunSummary};
use crate::producer::{ErrorChannel, ResultWriter};
use crate::runner::ModelRunner;
use crate::types::record::OutputResult;
use crate::types::report::ErrorReport;
use std::io::{BufRead, Write};
use std::time::Instant;
use tracing::{debug, error, info};

/// Records between progress log lines
const MILESTONE_INTERVAL: u64 = 1000;

/// Lifecycle state of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Initializing,
    Running,
    /// Input reached end of stream; terminal, successful
    Closed,
    /// A fatal error was reported; terminal
    Failed,
}

/// Request/response loop over the input, output and error channels.
pub struct StreamProtocolEngine<R, W, E> {
    model_id: String,
    input: InputReader<R>,
    output: ResultWriter<W>,
    errors: ErrorChannel<E>,
    state: EngineState,
    metrics: RunMetrics,
}

impl<R: BufRead, W: Write, E: Write> StreamProtocolEngine<R, W, E> {
    pub fn new(model_id: &str, input: R, output: W, errors: E) -> Self {
        Self {
            model_id: model_id.to_string(),
            input: InputReader::new(input),
            output: ResultWriter::new(output),
            errors: ErrorChannel::new(errors),
            state: EngineState::Idle,
            metrics: RunMetrics::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Build the model with `init`, then score records until end of stream.
    ///
    /// On error the engine is left `Failed` with the report already written
    /// to the error channel; the caller only has to terminate.
    pub fn serve<F>(&mut self, init: F) -> Result<RunSummary>
    where
        F: FnOnce() -> Result<ModelRunner>,
    {
        if self.state != EngineState::Idle {
            return Err(RunnerError::configuration(format!(
                "engine cannot start from state {:?}",
                self.state
            )));
        }

        self.transition(EngineState::Initializing);
        let outcome = init().and_then(|runner| {
            self.transition(EngineState::Running);
            self.run(runner)
        });

        match outcome {
            Ok(summary) => {
                self.transition(EngineState::Closed);
                self.metrics.log_summary(&self.model_id);
                Ok(summary)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn run(&mut self, mut runner: ModelRunner) -> Result<RunSummary> {
        info!(model = %self.model_id, "Processing model");

        while let Some(record) = self.input.next_record()? {
            let started = Instant::now();
            let probability = runner.compute_anomaly_probability(&record)?;

            let row_index = self.output.emitted();
            self.output.emit(OutputResult::new(row_index, probability))?;
            self.metrics.record(started.elapsed(), probability);

            let processed = self.metrics.records_processed();
            if processed % MILESTONE_INTERVAL == 0 {
                let stats = self.metrics.processing_stats();
                info!(
                    model = %self.model_id,
                    processed = processed,
                    throughput = format!("{:.1} rec/s", self.metrics.throughput()),
                    avg_latency_us = stats.mean_us,
                    "Processing milestone"
                );
            }
        }

        info!(
            model = %self.model_id,
            lines = self.input.lines_read(),
            "Input stream closed"
        );
        Ok(self.metrics.summary())
    }

    fn fail(&mut self, e: &RunnerError) {
        self.transition(EngineState::Failed);
        error!(model = %self.model_id, error = %e, "Model runner failed");

        let report = ErrorReport::from_error(e);
        if let Err(write_error) = self.errors.report(&report) {
            error!(
                error = %write_error,
                message = %report.error_text,
                "Failed to emit error message"
            );
        }
    }

    fn transition(&mut self, next: EngineState) {
        debug!(model = %self.model_id, from = ?self.state, to = ?next, "Engine state change");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::sequence::TransitionModelFactory;
    use crate::types::SummaryStats;

    fn runner() -> Result<ModelRunner> {
        ModelRunner::new(
            "test-model",
            &SummaryStats::new(0.0, 100.0, None)?,
            &AppConfig::default(),
            &TransitionModelFactory,
        )
    }

    #[test]
    fn test_serve_closes_on_end_of_stream() {
        let mut output = Vec::new();
        let mut errors = Vec::new();
        let mut engine =
            StreamProtocolEngine::new("test-model", &b"[0,10]\n[60,12]\n"[..], &mut output, &mut errors);
        assert_eq!(engine.state(), EngineState::Idle);

        let summary = engine.serve(runner).unwrap();
        assert_eq!(engine.state(), EngineState::Closed);
        assert_eq!(summary.records_processed, 2);
        drop(engine);

        assert_eq!(String::from_utf8(output).unwrap(), "[0,0.5]\n[1,0.5]\n");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_init_failure_moves_to_failed() {
        let mut output = Vec::new();
        let mut errors = Vec::new();
        let mut engine = StreamProtocolEngine::new("m", &b"[0,10]\n"[..], &mut output, &mut errors);

        let result = engine.serve(|| Err(RunnerError::configuration("bad stats")));
        assert!(result.is_err());
        assert_eq!(engine.state(), EngineState::Failed);
        drop(engine);

        assert!(output.is_empty());
        let report: ErrorReport =
            serde_json::from_str(String::from_utf8(errors).unwrap().trim_end()).unwrap();
        assert_eq!(report.error_text, "Configuration error: bad stats");
    }

    #[test]
    fn test_serve_twice_is_rejected() {
        let mut engine = StreamProtocolEngine::new("m", &b""[..], Vec::new(), Vec::new());
        engine.serve(runner).unwrap();
        assert!(engine.serve(runner).is_err());
        assert_eq!(engine.state(), EngineState::Closed);
    }
}
