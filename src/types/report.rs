//! Structured error payload written to the error channel on fatal failure

use serde::{Deserialize, Serialize};

/// The single message emitted on stderr before the process aborts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// Short human-readable failure description
    pub error_text: String,

    /// Full error chain and any captured backtrace
    pub diagnostic_info: String,
}

impl ErrorReport {
    pub fn new(error_text: impl Into<String>, diagnostic_info: impl Into<String>) -> Self {
        Self {
            error_text: error_text.into(),
            diagnostic_info: diagnostic_info.into(),
        }
    }

    /// Build a report from any error, walking its `source()` chain.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut diagnostic = format!("{error:?}");
        let mut source = error.source();
        while let Some(cause) = source {
            diagnostic.push_str(&format!("\nCaused by: {cause}"));
            source = cause.source();
        }
        Self::new(non_empty_text(error.to_string()), diagnostic)
    }

    /// Build a report from an `anyhow` error (binary boundary).
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        let text = format!("{error:#}");
        let text = if text.is_empty() {
            format!("{error:?}")
        } else {
            text
        };
        Self::new(text, format!("{error:?}"))
    }
}

fn non_empty_text(text: String) -> String {
    if text.is_empty() {
        "unknown error".to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunnerError;

    #[test]
    fn test_wire_field_names() {
        let report = ErrorReport::new("boom", "trace");
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, r#"{"errorText":"boom","diagnosticInfo":"trace"}"#);
    }

    #[test]
    fn test_from_error_includes_source_chain() {
        let error = RunnerError::io(
            "stdin",
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "closed early"),
        );
        let report = ErrorReport::from_error(&error);
        assert_eq!(report.error_text, "I/O error on stdin: closed early");
        assert!(report.diagnostic_info.contains("Caused by: closed early"));
    }

    #[test]
    fn test_from_anyhow_uses_alternate_chain() {
        let error = anyhow::anyhow!("inner").context("outer");
        let report = ErrorReport::from_anyhow(&error);
        assert_eq!(report.error_text, "outer: inner");
    }
}
