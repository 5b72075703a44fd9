//! Metric summary statistics supplied by the front end at startup

use crate::error::{Result, RunnerError};
use serde::{Deserialize, Serialize};

/// Summary statistics of the metric a model is created for.
///
/// Matches the `--stats` JSON object: `{"min": n, "max": n, "minResolution": n?}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SummaryStats {
    /// Smallest expected metric value
    pub min: f64,

    /// Largest expected metric value
    pub max: f64,

    /// Lower bound on the scalar encoder resolution
    #[serde(
        rename = "minResolution",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub min_resolution: Option<f64>,
}

impl SummaryStats {
    /// Create validated stats.
    pub fn new(min: f64, max: f64, min_resolution: Option<f64>) -> Result<Self> {
        let stats = Self {
            min,
            max,
            min_resolution,
        };
        stats.validate()?;
        Ok(stats)
    }

    /// Parse and validate the `--stats` JSON value.
    pub fn from_json(raw: &str) -> Result<Self> {
        let stats: SummaryStats = serde_json::from_str(raw).map_err(|e| {
            RunnerError::configuration(format!("--stats option value failed schema validation: {e}"))
        })?;
        stats.validate()?;
        Ok(stats)
    }

    /// Check the invariants: finite bounds, `min <= max`, finite resolution.
    pub fn validate(&self) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(RunnerError::configuration(format!(
                "stats bounds must be finite, got min={} max={}",
                self.min, self.max
            )));
        }
        if self.min > self.max {
            return Err(RunnerError::configuration(format!(
                "stats min ({}) exceeds max ({})",
                self.min, self.max
            )));
        }
        if let Some(resolution) = self.min_resolution {
            if !resolution.is_finite() {
                return Err(RunnerError::configuration(format!(
                    "stats minResolution must be finite, got {resolution}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_required_fields() {
        let stats = SummaryStats::from_json(r#"{"min": 0, "max": 100}"#).unwrap();
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 100.0);
        assert_eq!(stats.min_resolution, None);
    }

    #[test]
    fn test_parse_min_resolution() {
        let stats =
            SummaryStats::from_json(r#"{"min": -5.5, "max": 5.5, "minResolution": 0.2}"#).unwrap();
        assert_eq!(stats.min_resolution, Some(0.2));
    }

    #[test]
    fn test_rejects_missing_max() {
        assert!(SummaryStats::from_json(r#"{"min": 0}"#).is_err());
    }

    #[test]
    fn test_rejects_unknown_field() {
        assert!(SummaryStats::from_json(r#"{"min": 0, "max": 1, "mean": 0.5}"#).is_err());
    }

    #[test]
    fn test_rejects_non_numeric() {
        assert!(SummaryStats::from_json(r#"{"min": "0", "max": 1}"#).is_err());
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let err = SummaryStats::new(10.0, 1.0, None).unwrap_err();
        assert!(matches!(err, RunnerError::Configuration(_)));
    }

    #[test]
    fn test_equal_bounds_are_valid() {
        assert!(SummaryStats::new(3.0, 3.0, None).is_ok());
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(SummaryStats::new(f64::NEG_INFINITY, 1.0, None).is_err());
        assert!(SummaryStats::new(0.0, 1.0, Some(f64::NAN)).is_err());
    }
}
