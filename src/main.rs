// ============================================================================
// qui - Socket Queue Occupancy Monitor - Main Entry Point
// ============================================================================
//
// Polls /proc/net/{udp,udp6,tcp,tcp6} in a loop and prints every socket
// whose receive or send queue holds at least `--threshold` bytes.
//
// Architecture:
// - One thread: poll a round, print, sleep, repeat
// - Ctrl-C sets a flag that the loop checks between rounds
// - Reports go to stdout, diagnostics (tracing) go to stderr
//
// Exit status:
// - 0: stopped by Ctrl-C, `--rounds` reached, or stdout closed
// - 1: stdout write failure other than a closed pipe
// - 2: bad command line (clap)
// - 3: a polling round failed (table unreadable or malformed)
//
// ============================================================================

use core::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::io::{self, BufWriter};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use qui::history::{DEFAULT_EVENT_CAPACITY, HistoryManager};
use qui::preferences::{DEFAULT_BLIP_SIZE, DEFAULT_THRESHOLD};
use qui::{EXIT_ROUND_FAILURE, FORGET_IDLE_ROUNDS, Preferences, ProcNetTables, Reporter};

/// Watch socket send/receive queues via /proc/net.
#[derive(Parser)]
#[command(name = "qui", version, about = "Socket queue occupancy monitor")]
struct Cli {
    /// Report sockets with at least this many bytes queued.
    #[arg(short = 't', long, value_name = "BYTES", default_value_t = DEFAULT_THRESHOLD)]
    threshold: u32,

    /// Pause between rounds, fractions allowed.
    #[arg(short = 's', long, value_name = "MILLISECONDS", value_parser = parse_sleep, default_value = "10")]
    sleep: Duration,

    /// Watch TCP sockets.
    #[arg(short = 'T', long)]
    tcp: bool,

    /// Watch UDP sockets.
    #[arg(short = 'U', long)]
    udp: bool,

    /// Watch IPv4 sockets.
    #[arg(short = '4', long)]
    ipv4: bool,

    /// Watch IPv6 sockets.
    #[arg(short = '6', long)]
    ipv6: bool,

    /// Only sockets with this local or remote port.
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Check and print the receive queue.
    #[arg(short = 'i', long)]
    input: bool,

    /// Check and print the send queue.
    #[arg(short = 'o', long)]
    output: bool,

    /// Print timestamps with microseconds.
    #[arg(short = 'm', long)]
    microseconds: bool,

    /// Bytes per blip in the queue bar.
    #[arg(
        short = 'b',
        long,
        value_name = "BYTES",
        default_value_t = DEFAULT_BLIP_SIZE,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    blip_size: u32,

    /// Reopen the tables every round instead of rewinding them.
    #[arg(short = 'c', long)]
    close: bool,

    /// Log table headers and per-table progress to stderr.
    #[arg(short = 'd', long)]
    debug: bool,

    /// One JSON object per report line.
    #[arg(long)]
    json: bool,

    /// Stop after this many rounds.
    #[arg(long, value_name = "N")]
    rounds: Option<u64>,

    /// Keep the last N reported samples per socket and summarize them at exit.
    #[arg(long, value_name = "N")]
    history: Option<usize>,
}

/// Milliseconds as a non-negative decimal, e.g. `0.5` or `250`
fn parse_sleep(arg: &str) -> Result<Duration, String> {
    let millis: f64 = arg
        .parse()
        .map_err(|_| format!("malformed sleep time {arg}"))?;
    if !millis.is_finite() || millis < 0.0 {
        return Err(format!("malformed sleep time {arg}"));
    }
    Duration::try_from_secs_f64(millis / 1000.0).map_err(|e| format!("sleep time {arg}: {e}"))
}

impl Cli {
    fn preferences(&self) -> Preferences {
        Preferences {
            want_tcp: self.tcp,
            want_udp: self.udp,
            want_ipv4: self.ipv4,
            want_ipv6: self.ipv6,
            port: self.port,
            want_input: self.input,
            want_output: self.output,
            print_usecs: self.microseconds,
            threshold: self.threshold,
            blip_size: self.blip_size,
            sleep: self.sleep,
            close_after_reading: self.close,
            debug: self.debug,
        }
        .normalized()
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Exit status for a failed stdout write
fn write_failure(err: &io::Error) -> ExitCode {
    if err.kind() == io::ErrorKind::BrokenPipe {
        ExitCode::SUCCESS
    } else {
        error!(error = %err, "writing reports failed");
        ExitCode::FAILURE
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let prefs = cli.preferences();
    debug!(?prefs, "starting");

    // Ctrl-C only flips the flag; the current round always completes
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, AtomicOrdering::SeqCst);
    }) {
        warn!(error = %e, "cannot install Ctrl-C handler");
    }

    let mut tables = ProcNetTables::new();
    let stdout = BufWriter::new(io::stdout().lock());
    let mut reporter = Reporter::new(stdout, prefs.clone(), cli.json);
    if let Some(samples) = cli.history {
        reporter = reporter.with_history(HistoryManager::new(samples, DEFAULT_EVENT_CAPACITY));
    }

    // ========================================================================
    // MAIN POLLING LOOP
    // ========================================================================
    let mut completed: u64 = 0;
    loop {
        match tables.poll_round(&prefs, &mut reporter) {
            Ok(summary) => debug!(
                sources = summary.sources,
                entries = summary.entries,
                "round complete"
            ),
            Err(e) => {
                error!(table = %e.path().display(), error = %e, "polling round failed");
                return ExitCode::from(EXIT_ROUND_FAILURE);
            }
        }

        if let Some(err) = reporter.take_error() {
            return write_failure(&err);
        }
        if let Err(err) = reporter.flush() {
            return write_failure(&err);
        }
        if let Some(history) = reporter.history_mut() {
            let forgotten = history.forget_idle(FORGET_IDLE_ROUNDS);
            if forgotten > 0 {
                debug!(forgotten, tracked = history.len(), "dropped idle histories");
            }
        }

        completed += 1;
        if cli.rounds.is_some_and(|limit| completed >= limit) {
            break;
        }
        if !running.load(AtomicOrdering::SeqCst) {
            break;
        }
        std::thread::sleep(prefs.sleep);
    }

    if let Err(err) = reporter.write_history_summaries() {
        return write_failure(&err);
    }
    ExitCode::SUCCESS
}
