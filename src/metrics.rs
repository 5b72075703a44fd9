//! Per-run processing statistics for the model runner.

use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept for percentile estimates
const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Metrics collector for one model run
#[derive(Debug)]
pub struct RunMetrics {
    records_processed: u64,
    /// Per-record processing times (in microseconds)
    processing_times: Vec<u64>,
    /// Anomaly probability distribution buckets
    probability_buckets: [u64; 10],
    /// Records at or above the high-likelihood threshold
    high_likelihood: u64,
    high_likelihood_threshold: f64,
    start_time: Instant,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::with_threshold(0.99)
    }

    pub fn with_threshold(high_likelihood_threshold: f64) -> Self {
        Self {
            records_processed: 0,
            processing_times: Vec::with_capacity(1000),
            probability_buckets: [0; 10],
            high_likelihood: 0,
            high_likelihood_threshold,
            start_time: Instant::now(),
        }
    }

    /// Record a processed input line
    pub fn record(&mut self, processing_time: Duration, probability: f64) {
        self.records_processed += 1;

        self.processing_times.push(processing_time.as_micros() as u64);
        if self.processing_times.len() > MAX_LATENCY_SAMPLES {
            self.processing_times.drain(0..MAX_LATENCY_SAMPLES / 2);
        }

        let bucket = ((probability * 10.0) as usize).min(9);
        self.probability_buckets[bucket] += 1;

        if probability >= self.high_likelihood_threshold {
            self.high_likelihood += 1;
        }
    }

    pub fn records_processed(&self) -> u64 {
        self.records_processed
    }

    /// Records per second since the run started
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.records_processed as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Processing time percentiles over the retained samples
    pub fn processing_stats(&self) -> ProcessingStats {
        if self.processing_times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted = self.processing_times.clone();
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.5),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Snapshot of the run
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            records_processed: self.records_processed,
            high_likelihood: self.high_likelihood,
            probability_buckets: self.probability_buckets,
            processing: self.processing_stats(),
        }
    }

    /// Log a summary of the run
    pub fn log_summary(&self, model_id: &str) {
        let summary = self.summary();
        info!(
            model = %model_id,
            records = summary.records_processed,
            high_likelihood = summary.high_likelihood,
            throughput = format!("{:.1} rec/s", self.throughput()),
            mean_us = summary.processing.mean_us,
            p50_us = summary.processing.p50_us,
            p99_us = summary.processing.p99_us,
            max_us = summary.processing.max_us,
            "Model run summary"
        );

        let total: u64 = summary.probability_buckets.iter().sum();
        for (i, &count) in summary.probability_buckets.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let pct = (count as f64 / total as f64) * 100.0;
            info!(
                "  probability {:.1}-{:.1}: {:>8} ({:>5.1}%)",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct
            );
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Outcome of a cleanly closed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub records_processed: u64,
    pub high_likelihood: u64,
    pub probability_buckets: [u64; 10],
    pub processing: ProcessingStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let mut metrics = RunMetrics::new();

        metrics.record(Duration::from_micros(100), 0.5);
        metrics.record(Duration::from_micros(300), 0.995);
        metrics.record(Duration::from_micros(200), 1.0);

        let summary = metrics.summary();
        assert_eq!(summary.records_processed, 3);
        assert_eq!(summary.high_likelihood, 2);
        assert_eq!(summary.probability_buckets[5], 1);
        assert_eq!(summary.probability_buckets[9], 2);
        assert_eq!(summary.processing.mean_us, 200);
        assert_eq!(summary.processing.p50_us, 200);
        assert_eq!(summary.processing.max_us, 300);
    }

    #[test]
    fn test_empty_stats() {
        let metrics = RunMetrics::new();
        assert_eq!(metrics.processing_stats(), ProcessingStats::default());
        assert_eq!(metrics.records_processed(), 0);
    }

    #[test]
    fn test_latency_samples_bounded() {
        let mut metrics = RunMetrics::new();
        for _ in 0..(MAX_LATENCY_SAMPLES + 1) {
            metrics.record(Duration::from_micros(1), 0.1);
        }
        assert!(metrics.processing_stats().count as usize <= MAX_LATENCY_SAMPLES);
        assert_eq!(metrics.records_processed(), MAX_LATENCY_SAMPLES as u64 + 1);
    }
}
