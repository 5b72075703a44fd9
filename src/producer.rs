//! Output and error channel producers

use crate::error::{Result, RunnerError};
use crate::types::record::OutputResult;
use crate::types::report::ErrorReport;
use std::io::{self, Write};
use tracing::{debug, warn};

/// Encode `message` as one JSON line, write it and flush.
fn write_line<W: Write, T: serde::Serialize>(writer: &mut W, message: &T) -> io::Result<()> {
    let mut line = serde_json::to_string(message).map_err(io::Error::from)?;
    line.push('\n');
    writer.write_all(line.as_bytes())?;
    writer.flush()
}

/// Writes `[<rowIndex>, <anomalyProbability>]` results, one flushed line each.
pub struct ResultWriter<W> {
    writer: W,
    emitted: u64,
}

impl<W: Write> ResultWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, emitted: 0 }
    }

    /// Emit one result
    pub fn emit(&mut self, result: OutputResult) -> Result<()> {
        write_line(&mut self.writer, &result.to_message())
            .map_err(|e| RunnerError::io("stdout", e))?;
        self.emitted += 1;

        debug!(
            row = result.row_index,
            probability = result.anomaly_probability,
            "Result emitted"
        );
        Ok(())
    }

    /// Number of results written
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Writes the single structured error report.
pub struct ErrorChannel<W> {
    writer: W,
    reported: bool,
}

impl<W: Write> ErrorChannel<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            reported: false,
        }
    }

    /// Write `report` as one JSON line. Only the first report is written.
    pub fn report(&mut self, report: &ErrorReport) -> Result<()> {
        if self.reported {
            warn!(error = %report.error_text, "Error already reported, dropping");
            return Ok(());
        }
        self.reported = true;

        write_line(&mut self.writer, report).map_err(|e| RunnerError::io("stderr", e))
    }

    #[cfg(test)]
    pub fn has_reported(&self) -> bool {
        self.reported
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}
