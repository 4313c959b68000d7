//! watch-tomcat - Frontier servlet log watcher.
//!
//! Follows a Tomcat servlet log (stdin or a growing file), reconstructs
//! per-request records from the interleaved lines, keeps a sliding time
//! window of recent requests, and prints a periodic summary with per-rule
//! rankings.

use std::fs;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use frontier_watch::record::Record;
use frontier_watch::source::{LineSource, LogTailer};
use frontier_watch::stats::RecordStatistics;
use frontier_watch::util::{CancelToken, TimestampMode};
use frontier_watch::watcher::{Watcher, WatcherConfig};

/// Frontier servlet log watcher.
#[derive(Parser)]
#[command(name = "watch-tomcat", about = "Frontier servlet log watcher", version)]
struct Args {
    /// Sliding window length in seconds.
    #[arg(short, long, default_value = "60")]
    window_secs: u64,

    /// Stamp lines with arrival time instead of the log-embedded timestamps.
    #[arg(long)]
    ingestion_time: bool,

    /// Follow a log file instead of reading standard input.
    #[arg(short, long)]
    follow: Option<String>,

    /// Report interval in seconds.
    #[arg(short, long, default_value = "1")]
    interval: u64,

    /// JSON file with aggregation rules (defaults to the built-in set).
    #[arg(long)]
    stats_rules: Option<String>,

    /// Entries shown per ranking.
    #[arg(long, default_value = "10")]
    top: usize,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber. Diagnostics go to stderr so stdout
/// stays reserved for the report stream.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("frontier_watch={}", level).parse().unwrap())
        .add_directive(format!("watch_tomcat={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the aggregation rule set, or the built-in default.
fn load_statistics(path: Option<&str>) -> Result<RecordStatistics, String> {
    match path {
        None => Ok(RecordStatistics::default()),
        Some(path) => {
            let json = fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?;
            RecordStatistics::from_json(&json).map_err(|e| format!("{path}: {e}"))
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!("watch-tomcat {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: window={}s, interval={}s, timestamps={}",
        args.window_secs,
        args.interval,
        if args.ingestion_time {
            "ingestion"
        } else {
            "log-embedded"
        }
    );

    let statistics = match load_statistics(args.stats_rules.as_deref()) {
        Ok(statistics) => statistics,
        Err(e) => {
            error!("Failed to load stats rules: {}", e);
            return ExitCode::from(2);
        }
    };

    let mut source = match &args.follow {
        Some(path) => match LogTailer::follow(path) {
            Ok(tailer) => {
                info!("Following {}", path);
                LineSource::Follow(tailer)
            }
            Err(e) => {
                error!("Cannot follow {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => LineSource::Stdin,
    };

    let timestamp_mode = if args.ingestion_time {
        TimestampMode::Ingestion
    } else {
        TimestampMode::LogEmbedded
    };
    let watcher = Arc::new(Mutex::new(Watcher::new(WatcherConfig {
        window_length_secs: args.window_secs,
        timestamp_mode,
    })));

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            cancel.cancel();
        }) {
            warn!("Failed to set Ctrl-C handler: {}", e);
        }
    }

    // Ingestion path: drives the whole pipeline, one line at a time.
    let ingest = {
        let watcher = Arc::clone(&watcher);
        let cancel = cancel.clone();
        thread::spawn(move || {
            let result = source.drain(&cancel, |line| match watcher.lock() {
                Ok(mut w) => w.advance(line),
                Err(_) => cancel.cancel(),
            });
            if let Err(e) = result {
                error!("Input source failed: {}", e);
            }
            debug!("Ingestion loop ended");
        })
    };

    // Reporting path: read-only summary on a fixed interval.
    let interval = Duration::from_secs(args.interval.max(1));
    while !cancel.is_cancelled() {
        // Lock scope: copy out the summary, aggregate outside it.
        let (span_secs, history_len, record_count, records) = match watcher.lock() {
            Ok(w) => (
                w.window_span_secs(),
                w.history_len(),
                w.record_count(),
                w.records().map(|(_, r)| r.clone()).collect::<Vec<Record>>(),
            ),
            Err(_) => {
                error!("Watcher state poisoned; shutting down");
                cancel.cancel();
                break;
            }
        };

        println!(
            "At {} for the last {:.2} seconds:",
            Local::now().format("%d/%b/%Y %H:%M:%S"),
            span_secs
        );
        for report in statistics.aggregate(records.iter()) {
            if report.is_empty() {
                continue;
            }
            println!();
            println!("{}:", report.label);
            for (rank, (group, total)) in report.top(args.top).iter().enumerate() {
                println!("  -> ({}): {} [{}]", rank + 1, group, total);
            }
        }
        println!();
        println!("records: {}", record_count);
        println!("history: {}", history_len);
        println!();

        cancel.sleep(interval);
    }

    info!("Shutting down...");
    cancel.cancel();
    if ingest.join().is_err() {
        error!("Ingestion thread panicked");
        return ExitCode::FAILURE;
    }
    info!("Shutdown complete");
    ExitCode::SUCCESS
}
