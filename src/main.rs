//! Model Runner - Main Entry Point
//!
//! Runs one anomaly model: reads `[<timestamp>, <value>]` lines from stdin and
//! writes `[<rowIndex>, <anomalyProbability>]` lines to stdout. On failure a
//! single JSON error report is written to stderr and the process exits with
//! status 1 without unwinding, so nothing else reaches stderr.

use anomaly_model_runner::{
    config::{AppConfig, LogFormat, LoggingConfig},
    producer::ErrorChannel,
    ErrorReport, ModelRunner, RunnerError, StreamProtocolEngine, SummaryStats,
    TransitionModelFactory, FATAL_EXIT_CODE,
};
use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use std::backtrace::Backtrace;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Start a model runner that scores a single metric stream
#[derive(Parser, Debug)]
#[command(name = "model-runner", version)]
struct Args {
    /// Model id string
    #[arg(long = "model")]
    model_id: String,

    /// Metric stats: {"min": <number>, "max": <number>, "minResolution": <number>}
    #[arg(long)]
    stats: String,

    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Validated startup parameters
struct Startup {
    model_id: String,
    stats: SummaryStats,
    config: AppConfig,
}

fn main() {
    install_panic_hook();

    let startup = match parse_startup() {
        Ok(startup) => startup,
        Err(e) => abort(&ErrorReport::from_anyhow(&e)),
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut engine = StreamProtocolEngine::new(
        &startup.model_id,
        stdin.lock(),
        stdout.lock(),
        io::stderr(),
    );

    let result = engine.serve(|| {
        ModelRunner::new(
            &startup.model_id,
            &startup.stats,
            &startup.config,
            &TransitionModelFactory,
        )
    });

    match result {
        Ok(summary) => info!(
            model = %startup.model_id,
            records = summary.records_processed,
            "Model runner finished"
        ),
        // The engine has already written the error report
        Err(_) => process::exit(FATAL_EXIT_CODE),
    }
}

/// Parse arguments, validate stats, load configuration and start logging.
fn parse_startup() -> Result<Startup> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            process::exit(0);
        }
        Err(e) => {
            return Err(RunnerError::configuration(format!("command-line error: {}", e.render())).into())
        }
    };

    if args.model_id.trim().is_empty() {
        return Err(RunnerError::configuration("Missing or empty --model option value").into());
    }
    if args.stats.trim().is_empty() {
        return Err(RunnerError::configuration("Missing or empty --stats option value").into());
    }

    let stats = SummaryStats::from_json(&args.stats)?;
    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.logging)?;

    info!(
        model = %args.model_id,
        min = stats.min,
        max = stats.max,
        min_resolution = ?stats.min_resolution,
        "Starting model runner"
    );

    Ok(Startup {
        model_id: args.model_id,
        stats,
        config,
    })
}

/// Log to the configured file; stdout and stderr belong to the protocol.
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let Some(path) = &config.file else {
        return Ok(());
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {path}"))?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false);

    match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

/// Route panics into the structured error report instead of raw stderr text.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string());
        let diagnostic = format!("{info}\n{}", Backtrace::force_capture());
        abort(&ErrorReport::new(message, diagnostic));
    }));
}

/// Write `report` to stderr and terminate immediately with the fatal status.
fn abort(report: &ErrorReport) -> ! {
    error!(error = %report.error_text, "Model runner failed");

    let mut channel = ErrorChannel::new(io::stderr());
    if let Err(e) = channel.report(report) {
        error!(error = %e, message = %report.error_text, "Failed to emit error message to stderr");
    }
    process::exit(FATAL_EXIT_CODE)
}
