//! Sample Metric Stream Generator
//!
//! Prints `[<timestamp>, <value>]` lines suitable for piping into
//! `model-runner`. Values follow a daily cycle with uniform noise and
//! optional periodic spikes.

use anomaly_model_runner::types::InputMessage;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;
use std::io::{self, BufWriter, Write};
use std::time::Duration;
use tracing::info;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Parser, Debug)]
#[command(name = "sample-stream", about = "Generate a sample metric stream", version)]
struct Args {
    /// Number of samples to print
    #[arg(long, default_value_t = 1000)]
    count: u64,

    /// Seconds between sample timestamps
    #[arg(long, default_value_t = 300.0)]
    interval: f64,

    /// Epoch seconds of the first sample
    #[arg(long, default_value_t = 1_700_000_000.0)]
    start: f64,

    /// Mean value of the metric
    #[arg(long, default_value_t = 50.0)]
    baseline: f64,

    /// Amplitude of the daily cycle
    #[arg(long, default_value_t = 10.0)]
    amplitude: f64,

    /// Maximum absolute noise added to each sample
    #[arg(long, default_value_t = 1.0)]
    noise: f64,

    /// Insert a spike every N samples (0 disables spikes)
    #[arg(long, default_value_t = 0)]
    spike_every: u64,

    /// Height of each spike above the regular value
    #[arg(long, default_value_t = 40.0)]
    spike_size: f64,

    /// Seed for reproducible streams
    #[arg(long)]
    seed: Option<u64>,

    /// Delay between printed lines in milliseconds
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
}

/// Deterministic-shape metric generator
struct StreamGenerator {
    rng: StdRng,
    args: Args,
    spikes: u64,
}

impl StreamGenerator {
    fn new(args: Args) -> Self {
        let rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng, args, spikes: 0 }
    }

    /// Sample `index` of the stream
    fn sample(&mut self, index: u64) -> InputMessage {
        let timestamp = self.args.start + index as f64 * self.args.interval;
        let phase = (timestamp % SECONDS_PER_DAY) / SECONDS_PER_DAY;

        let mut value = self.args.baseline + self.args.amplitude * (TAU * phase).sin();
        if self.args.noise > 0.0 {
            value += self.rng.gen_range(-self.args.noise..=self.args.noise);
        }
        if self.args.spike_every > 0 && index > 0 && index % self.args.spike_every == 0 {
            value += self.args.spike_size;
            self.spikes += 1;
        }

        InputMessage(timestamp, value)
    }
}

fn main() -> anyhow::Result<()> {
    // stdout carries the stream, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sample_stream=info".parse()?),
        )
        .init();

    let args = Args::parse();
    info!(
        count = args.count,
        interval = args.interval,
        baseline = args.baseline,
        spike_every = args.spike_every,
        seed = ?args.seed,
        "Configuration loaded"
    );

    let count = args.count;
    let delay = Duration::from_millis(args.delay_ms);
    let mut generator = StreamGenerator::new(args);
    let mut out = BufWriter::new(io::stdout().lock());

    for index in 0..count {
        let sample = generator.sample(index);
        serde_json::to_writer(&mut out, &sample)?;
        out.write_all(b"\n")?;

        if !delay.is_zero() {
            out.flush()?;
            std::thread::sleep(delay);
        }
    }
    out.flush()?;

    info!(count = count, spikes = generator.spikes, "Completed");
    Ok(())
}
