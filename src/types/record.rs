//! Per-sample data flowing through the scoring loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire shape of one input message: `[<unix-epoch-seconds>, <scalar-value>]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputMessage(pub f64, pub f64);

/// Wire shape of one output message: `[<rowIndex>, <anomalyProbability>]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage(pub u64, pub f64);

/// A decoded metric data sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputRecord {
    /// Sample timestamp (UTC)
    pub timestamp: DateTime<Utc>,
    /// Metric value
    pub value: f64,
}

impl InputRecord {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Build a record from epoch seconds (fractional seconds allowed).
    ///
    /// Returns `None` when the timestamp is outside chrono's range or the
    /// value is not finite.
    pub fn from_epoch_seconds(seconds: f64, value: f64) -> Option<Self> {
        if !seconds.is_finite() || !value.is_finite() {
            return None;
        }
        let whole = seconds.floor();
        if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
            return None;
        }
        let nanos = (((seconds - whole) * 1e9).round() as u32).min(999_999_999);
        let timestamp = DateTime::from_timestamp(whole as i64, nanos)?;
        Some(Self { timestamp, value })
    }
}

impl TryFrom<InputMessage> for InputRecord {
    type Error = String;

    fn try_from(message: InputMessage) -> Result<Self, Self::Error> {
        let InputMessage(seconds, value) = message;
        Self::from_epoch_seconds(seconds, value)
            .ok_or_else(|| format!("timestamp {seconds} or value {value} out of range"))
    }
}

/// Result emitted for one processed input record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputResult {
    /// 0-based index of the corresponding input sample
    pub row_index: u64,
    /// Calibrated anomaly probability in [0, 1]
    pub anomaly_probability: f64,
}

impl OutputResult {
    pub fn new(row_index: u64, anomaly_probability: f64) -> Self {
        Self {
            row_index,
            anomaly_probability,
        }
    }

    pub fn to_message(self) -> OutputMessage {
        OutputMessage(self.row_index, self.anomaly_probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_input_message_from_array() {
        let message: InputMessage = serde_json::from_str("[1438649711, 835.93679]").unwrap();
        assert_eq!(message, InputMessage(1438649711.0, 835.93679));
    }

    #[test]
    fn test_input_message_rejects_wrong_arity() {
        assert!(serde_json::from_str::<InputMessage>("[1]").is_err());
        assert!(serde_json::from_str::<InputMessage>("[1, 2, 3]").is_err());
        assert!(serde_json::from_str::<InputMessage>("{\"t\": 1}").is_err());
    }

    #[test]
    fn test_fractional_epoch_seconds() {
        let record = InputRecord::from_epoch_seconds(60.5, 1.0).unwrap();
        assert_eq!(record.timestamp.timestamp(), 60);
        assert_eq!(record.timestamp.nanosecond(), 500_000_000);
    }

    #[test]
    fn test_out_of_range_timestamp() {
        assert!(InputRecord::from_epoch_seconds(1e30, 1.0).is_none());
        assert!(InputRecord::try_from(InputMessage(f64::MAX, 0.0)).is_err());
    }

    #[test]
    fn test_output_message_shape() {
        let json = serde_json::to_string(&OutputResult::new(2, 0.5).to_message()).unwrap();
        assert_eq!(json, "[2,0.5]");
    }
}
