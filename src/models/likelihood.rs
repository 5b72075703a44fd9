//! Anomaly likelihood estimation.
//!
//! Turns raw anomaly scores into a calibrated probability. The estimator keeps
//! a bounded history of `(timestamp, value, raw score)` observations and
//! periodically fits a normal distribution to moving averages of the raw
//! scores. Each new raw score is smoothed with the same moving average and
//! scored against that fit: the result is the probability that a score drawn
//! from the fitted distribution is at or below the smoothed score.
//!
//! Until `learning_period + estimation_samples` records have been seen the
//! estimator answers with [`NEUTRAL_PROBABILITY`].

use crate::config::LikelihoodConfig;
use crate::error::{Result, RunnerError};
use chrono::{DateTime, Utc};
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::VecDeque;
use tracing::debug;

/// Probability reported while there is no signal yet.
pub const NEUTRAL_PROBABILITY: f64 = 0.5;

/// Fitted means are raised to at least this value.
const MIN_MEAN: f64 = 0.03;
/// Fitted variances are raised to at least this value.
const MIN_VARIANCE: f64 = 0.0003;
/// Tail probability of a red alert.
const RED_TAIL: f64 = 1.0 - 0.99999;
/// Tail probability used in place of repeated red alerts.
const YELLOW_TAIL: f64 = 1.0 - 0.999;

/// Running mean over the last `size` values.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: VecDeque<f64>,
    total: f64,
    size: usize,
}

impl MovingAverage {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            window: VecDeque::with_capacity(size + 1),
            total: 0.0,
            size,
        }
    }

    /// Add a value and return the new average.
    pub fn push(&mut self, value: f64) -> f64 {
        self.window.push_back(value);
        self.total += value;
        if self.window.len() > self.size {
            if let Some(evicted) = self.window.pop_front() {
                self.total -= evicted;
            }
        }
        self.current()
    }

    pub fn current(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.total / self.window.len() as f64
        }
    }
}

/// Normal distribution parameters fitted to averaged raw scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distribution {
    pub mean: f64,
    pub variance: f64,
    pub stdev: f64,
}

impl Distribution {
    /// A distribution wide enough that every score maps to about 0.5.
    pub fn null() -> Self {
        Self {
            mean: 0.5,
            variance: 1e6,
            stdev: 1e3,
        }
    }

    /// Fit mean and population variance to `samples`.
    ///
    /// With `lower_bound` the mean and variance are raised to their floors so
    /// a long run of perfect predictions cannot collapse the fit.
    pub fn estimate(samples: &[f64], lower_bound: bool) -> Self {
        if samples.is_empty() {
            return Self::null();
        }
        let n = samples.len() as f64;
        let mut mean = samples.iter().sum::<f64>() / n;
        let mut variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

        if lower_bound {
            mean = mean.max(MIN_MEAN);
            variance = variance.max(MIN_VARIANCE);
        }
        let stdev = if variance > 0.0 { variance.sqrt() } else { 0.0 };

        Self {
            mean,
            variance,
            stdev,
        }
    }

    /// Probability of a sample above `x`.
    ///
    /// A degenerate fit (zero or non-finite spread) saturates: 0 above the
    /// mean, 1 below it and 0.5 exactly at it.
    pub fn tail_probability(&self, x: f64) -> f64 {
        match Normal::new(self.mean, self.stdev) {
            Ok(normal) if self.stdev.is_finite() => normal.sf(x),
            _ => {
                if x > self.mean {
                    0.0
                } else if x < self.mean {
                    1.0
                } else {
                    NEUTRAL_PROBABILITY
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    timestamp: DateTime<Utc>,
    value: f64,
    raw_score: f64,
}

/// Leading history entries excluded from a fit.
///
/// The model's first `learning_period` outputs are noise; once that many
/// records have been shifted out of the window there is nothing left to skip.
fn skip_records(num_ingested: usize, window_size: usize, learning_period: usize) -> usize {
    let shifted_out = num_ingested.saturating_sub(window_size);
    num_ingested.min(learning_period.saturating_sub(shifted_out))
}

/// Suppress a red alert that directly follows another one.
fn filter_tail(tail: f64, previous: Option<f64>) -> f64 {
    match previous {
        Some(prev) if tail <= RED_TAIL && prev <= RED_TAIL => YELLOW_TAIL,
        _ => tail,
    }
}

/// Streaming anomaly likelihood estimator.
#[derive(Debug, Clone)]
pub struct AnomalyLikelihood {
    params: LikelihoodConfig,
    history: VecDeque<Observation>,
    distribution: Option<Distribution>,
    moving_average: MovingAverage,
    /// Unfiltered tail probability of the previous record
    last_tail: Option<f64>,
    iteration: u64,
}

impl Default for AnomalyLikelihood {
    fn default() -> Self {
        Self::new(LikelihoodConfig::default())
    }
}

impl AnomalyLikelihood {
    pub fn new(params: LikelihoodConfig) -> Self {
        let averaging_window = params.averaging_window;
        Self {
            history: VecDeque::with_capacity(params.historic_window_size.min(8640) + 1),
            distribution: None,
            moving_average: MovingAverage::new(averaging_window),
            last_tail: None,
            iteration: 0,
            params,
        }
    }

    /// Records processed so far.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Observations currently held in the history window.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Current fit, if one has been made.
    pub fn distribution(&self) -> Option<Distribution> {
        self.distribution
    }

    /// Whether the estimator is still inside its warm-up window.
    pub fn in_probation(&self) -> bool {
        (self.iteration as usize) < self.params.probationary_period()
    }

    /// Map a probability onto a log scale where 0.99999 becomes 0.5.
    pub fn log_likelihood(probability: f64) -> f64 {
        (1.000_000_000_1 - probability).ln() / (1e-10_f64).ln()
    }

    /// Score one observation and fold it into the history.
    ///
    /// Observations must arrive in processing order; they are never
    /// reordered.
    pub fn update(&mut self, value: f64, raw_score: f64, timestamp: DateTime<Utc>) -> Result<f64> {
        if !value.is_finite() || !raw_score.is_finite() {
            return Err(RunnerError::Estimation(format!(
                "non-finite observation value={value} raw_score={raw_score}"
            )));
        }

        let probability = if self.in_probation() {
            NEUTRAL_PROBABILITY
        } else {
            let current = self.distribution;
            let distribution = match current {
                Some(d) if self.iteration % self.params.reestimation_period as u64 != 0 => d,
                _ => self.reestimate(),
            };

            let average = self.moving_average.push(raw_score);
            let tail = distribution.tail_probability(average);
            let filtered = filter_tail(tail, self.last_tail);
            self.last_tail = Some(tail);

            (1.0 - filtered).clamp(0.0, 1.0)
        };

        self.history.push_back(Observation {
            timestamp,
            value,
            raw_score,
        });
        if self.history.len() > self.params.historic_window_size {
            self.history.pop_front();
        }
        self.iteration += 1;

        Ok(probability)
    }

    /// Refit the distribution over the history and rebuild the moving average.
    fn reestimate(&mut self) -> Distribution {
        let skip = skip_records(
            self.iteration as usize,
            self.params.historic_window_size,
            self.params.learning_period,
        );

        let mut moving_average = MovingAverage::new(self.params.averaging_window);
        let averaged: Vec<(f64, f64)> = self
            .history
            .iter()
            .map(|obs| (obs.value, moving_average.push(obs.raw_score)))
            .collect();

        let fit_end = averaged.len().saturating_sub(self.params.excluded_recent);
        let (distribution, metric_variance) = if fit_end <= skip {
            (Distribution::null(), None)
        } else {
            let fitted = &averaged[skip..fit_end];
            let values: Vec<f64> = fitted.iter().map(|&(value, _)| value).collect();
            let scores: Vec<f64> = fitted.iter().map(|&(_, score)| score).collect();

            // A flat metric still gets the floored fit
            (
                Distribution::estimate(&scores, true),
                Some(Distribution::estimate(&values, false).variance),
            )
        };

        debug!(
            iteration = self.iteration,
            skip = skip,
            samples = fit_end.saturating_sub(skip),
            mean = distribution.mean,
            stdev = distribution.stdev,
            metric_variance = ?metric_variance,
            window_start = ?self.history.front().map(|obs| obs.timestamp),
            "Anomaly score distribution re-estimated"
        );

        self.last_tail = averaged
            .last()
            .map(|&(_, score)| distribution.tail_probability(score));
        self.moving_average = moving_average;
        self.distribution = Some(distribution);
        distribution
    }
}
