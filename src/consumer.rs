//! Input stream consumer for metric data samples

use crate::error::{Result, RunnerError};
use crate::types::record::{InputMessage, InputRecord};
use std::io::{BufRead, ErrorKind};
use tracing::trace;

/// Reads newline-delimited `[<timestamp>, <value>]` messages.
///
/// Reads exactly one line per call and never ahead, so the sender sees
/// back-pressure through the pipe.
pub struct InputReader<R> {
    reader: R,
    buffer: String,
    lines_read: u64,
}

impl<R: BufRead> InputReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: String::new(),
            lines_read: 0,
        }
    }

    /// Wait for the next message and decode it.
    ///
    /// Returns `Ok(None)` once the sender closes the stream.
    pub fn next_record(&mut self) -> Result<Option<InputRecord>> {
        self.buffer.clear();
        let read = match self.reader.read_line(&mut self.buffer) {
            Ok(read) => read,
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(RunnerError::Protocol {
                    line: self.lines_read + 1,
                    reason: format!("input is not valid UTF-8: {e}"),
                });
            }
            Err(e) => return Err(RunnerError::io("stdin", e)),
        };

        if read == 0 {
            return Ok(None);
        }
        self.lines_read += 1;
        let line = self.lines_read;

        let message: InputMessage =
            serde_json::from_str(&self.buffer).map_err(|e| RunnerError::Protocol {
                line,
                reason: format!("expected [<timestamp>, <value>]: {e}"),
            })?;
        let record =
            InputRecord::try_from(message).map_err(|reason| RunnerError::Protocol { line, reason })?;

        trace!(line = line, timestamp = %record.timestamp, value = record.value, "Input record decoded");
        Ok(Some(record))
    }

    /// Lines consumed so far
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(input: &str) -> InputReader<Cursor<Vec<u8>>> {
        InputReader::new(Cursor::new(input.as_bytes().to_vec()))
    }

    #[test]
    fn test_reads_until_end_of_stream() {
        let mut input = reader("[0, 10]\n[60, 12.5]\n");

        let first = input.next_record().unwrap().unwrap();
        assert_eq!(first.timestamp.timestamp(), 0);
        assert_eq!(first.value, 10.0);

        let second = input.next_record().unwrap().unwrap();
        assert_eq!(second.value, 12.5);

        assert!(input.next_record().unwrap().is_none());
        assert_eq!(input.lines_read(), 2);
    }

    #[test]
    fn test_last_line_without_newline() {
        let mut input = reader("[120, 11]");
        assert!(input.next_record().unwrap().is_some());
        assert!(input.next_record().unwrap().is_none());
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut input = reader("[0, 1]\r\n");
        assert_eq!(input.next_record().unwrap().unwrap().value, 1.0);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let mut input = reader("[0, 1]\nnot-json\n");
        input.next_record().unwrap();

        match input.next_record() {
            Err(RunnerError::Protocol { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_arity_is_protocol_error() {
        assert!(matches!(
            reader("[1]\n").next_record(),
            Err(RunnerError::Protocol { .. })
        ));
        assert!(matches!(
            reader("[1, 2, 3]\n").next_record(),
            Err(RunnerError::Protocol { .. })
        ));
    }

    #[test]
    fn test_blank_line_is_protocol_error() {
        assert!(matches!(
            reader("\n").next_record(),
            Err(RunnerError::Protocol { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_is_protocol_error() {
        let mut input = InputReader::new(Cursor::new(vec![0xff, 0xfe, b'\n']));
        assert!(matches!(
            input.next_record(),
            Err(RunnerError::Protocol { line: 1, .. })
        ));
    }
}
