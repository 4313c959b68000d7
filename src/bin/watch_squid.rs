//! watch-squid - Frontier squid access-log parser.
//!
//! Reads the squid access log from standard input, one request per line,
//! and prints a summary line for each record that carries a user identity
//! in its X-Frontier-Id header. No correlation, no windowing.

use std::process::ExitCode;

use clap::Parser;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use frontier_watch::source::LineSource;
use frontier_watch::squid;
use frontier_watch::util::CancelToken;

/// Frontier squid access-log parser.
#[derive(Parser)]
#[command(name = "watch-squid", about = "Frontier squid access-log parser", version)]
struct Args {
    /// Print every parsed record, not only those with a user identity.
    #[arg(short, long)]
    all: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

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
        .add_directive(format!("watch_squid={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

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

    let result = LineSource::Stdin.drain(&cancel, |line| {
        if line.trim().is_empty() {
            return;
        }
        match squid::parse_line(line) {
            Some(record) => {
                if let Some(userdn) = record.fid_userdn.as_deref() {
                    print_record(&record, userdn);
                } else if args.all {
                    print_record(&record, "-");
                }
            }
            None => warn!(line, "unparseable access-log line"),
        }
    });

    if let Err(e) = result {
        tracing::error!("Input failed: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// One summary line per request: when, who, from where, how much, to what.
fn print_record(record: &squid::SquidRecord, userdn: &str) {
    println!(
        "{:.6} ({}) {} {} {} {} > {} {} {}",
        record.timestamp_usecs as f64 * 1e-6,
        userdn,
        record.client_ip,
        record.fid_sw_release,
        record.size,
        record.fid_uid.as_deref().unwrap_or("-"),
        record.server,
        record.query,
        record.servlet,
    );
}
