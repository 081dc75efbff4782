// ============================================================================
// REPORT FORMATTING
// ============================================================================
// Turns a reported SocketEntry into one output line.
//
// === TEXT FORMAT ===
//   12:04:31.207 10.0.0.5:80 10.0.0.9:51234 Q: 170000 #+ 0
//   ^time        ^local      ^remote           ^inbound   ^outbound
//
// Each queue size is followed by a blip bar when it is at least one blip
// size: one '#' per two blips, a trailing '+' for an odd one.
//
// === JSON FORMAT ===
//   {"timestamp":"2024-03-01T12:04:31.207+01:00","local":"10.0.0.5:80",...}
// One object per line, fields of SocketEntry plus an RFC 3339 timestamp.

use std::fmt::Write as _;
use std::io;
use std::net::SocketAddr;

use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;

use crate::history::{History, HistoryManager};
use crate::preferences::Preferences;
use crate::procnet::{EntrySink, RoundTimestamp, SocketEntry};

// ============================================================================
// REPORT DECISION
// ============================================================================

/// Whether any of the wanted queues reached the threshold
#[must_use]
pub fn exceeds_threshold(entry: &SocketEntry, prefs: &Preferences) -> bool {
    (prefs.want_input && entry.inbound_queue >= prefs.threshold)
        || (prefs.want_output && entry.outbound_queue >= prefs.threshold)
}

/// Occupancy recorded in history: the larger of the wanted queues
#[must_use]
pub fn occupancy(entry: &SocketEntry, prefs: &Preferences) -> u32 {
    let inbound = if prefs.want_input { entry.inbound_queue } else { 0 };
    let outbound = if prefs.want_output { entry.outbound_queue } else { 0 };
    inbound.max(outbound)
}

// ============================================================================
// TEXT OUTPUT
// ============================================================================

fn local_time(timestamp: RoundTimestamp) -> DateTime<Local> {
    DateTime::<Local>::from(timestamp.as_system_time())
}

/// `HH:MM:SS.mmm`, or `HH:MM:SS.uuuuuu` with `usecs`, in local time
#[must_use]
pub fn format_timestamp(timestamp: RoundTimestamp, usecs: bool) -> String {
    let pattern = if usecs { "%H:%M:%S%.6f" } else { "%H:%M:%S%.3f" };
    local_time(timestamp).format(pattern).to_string()
}

/// Blip bar for `value`, including its leading space; empty below one blip
#[must_use]
pub fn format_blips(value: u32, blip_size: u32) -> String {
    let blips = value.checked_div(blip_size).unwrap_or(0);
    if blips == 0 {
        return String::new();
    }

    let full = (blips / 2) as usize;
    let mut bar = String::with_capacity(full + 2);
    bar.push(' ');
    bar.extend(std::iter::repeat_n('#', full));
    if blips % 2 == 1 {
        bar.push('+');
    }
    bar
}

/// One text report line, without the newline
#[must_use]
pub fn format_report(entry: &SocketEntry, timestamp: RoundTimestamp, prefs: &Preferences) -> String {
    let mut line = format!(
        "{} {} {} Q:",
        format_timestamp(timestamp, prefs.print_usecs),
        entry.local,
        entry.remote
    );
    // Writing into a String cannot fail
    if prefs.want_input {
        let _ = write!(line, " {}", entry.inbound_queue);
        line.push_str(&format_blips(entry.inbound_queue, prefs.blip_size));
    }
    if prefs.want_output {
        let _ = write!(line, " {}", entry.outbound_queue);
        line.push_str(&format_blips(entry.outbound_queue, prefs.blip_size));
    }
    line
}

// ============================================================================
// JSON OUTPUT
// ============================================================================

fn rfc3339(timestamp: RoundTimestamp, usecs: bool) -> String {
    let precision = if usecs {
        SecondsFormat::Micros
    } else {
        SecondsFormat::Millis
    };
    local_time(timestamp).to_rfc3339_opts(precision, false)
}

/// One JSON report record
#[derive(Debug, Serialize)]
pub struct ReportRecord<'a> {
    pub timestamp: String,
    #[serde(flatten)]
    pub entry: &'a SocketEntry,
}

impl<'a> ReportRecord<'a> {
    #[must_use]
    pub fn new(entry: &'a SocketEntry, timestamp: RoundTimestamp, prefs: &Preferences) -> Self {
        Self {
            timestamp: rfc3339(timestamp, prefs.print_usecs),
            entry,
        }
    }
}

/// One JSON report line, without the newline
///
/// # Errors
///
/// Propagates `serde_json` serialization failures.
pub fn format_report_json(
    entry: &SocketEntry,
    timestamp: RoundTimestamp,
    prefs: &Preferences,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ReportRecord::new(entry, timestamp, prefs))
}

// ============================================================================
// HISTORY SUMMARY
// ============================================================================

/// Exit summary of one socket pair's history
#[derive(Debug, Serialize)]
pub struct HistorySummary {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub samples: usize,
    pub peak_occupancy: Option<u32>,
    pub peak_timestamp: Option<String>,
    pub last_updated: Option<String>,
    #[serde(skip)]
    peak_clock: Option<String>,
}

impl HistorySummary {
    #[must_use]
    pub fn new(local: SocketAddr, remote: SocketAddr, history: &History, prefs: &Preferences) -> Self {
        let peak = history.peak_sample();
        Self {
            local,
            remote,
            samples: history.sample_count(),
            peak_occupancy: peak.map(|s| s.occupancy),
            peak_timestamp: peak.map(|s| rfc3339(s.timestamp, prefs.print_usecs)),
            last_updated: history
                .last_updated()
                .map(|ts| rfc3339(ts, prefs.print_usecs)),
            peak_clock: peak.map(|s| format_timestamp(s.timestamp, prefs.print_usecs)),
        }
    }

    /// `local remote: N samples, peak P at HH:MM:SS.mmm`
    #[must_use]
    pub fn to_text(&self) -> String {
        match (self.peak_occupancy, &self.peak_clock) {
            (Some(peak), Some(clock)) => format!(
                "{} {}: {} samples, peak {peak} at {clock}",
                self.local, self.remote, self.samples
            ),
            _ => format!("{} {}: no samples", self.local, self.remote),
        }
    }
}

// ============================================================================
// REPORTER
// ============================================================================

/// Entry sink that prints every socket over the threshold
///
/// A failed write is kept and every later entry is ignored; the polling
/// loop checks `take_error()` after each round.
#[derive(Debug)]
pub struct Reporter<W: io::Write> {
    out: W,
    prefs: Preferences,
    json: bool,
    history: Option<HistoryManager>,
    reported: usize,
    error: Option<io::Error>,
}

impl<W: io::Write> Reporter<W> {
    #[must_use]
    pub fn new(out: W, prefs: Preferences, json: bool) -> Self {
        Self {
            out,
            prefs,
            json,
            history: None,
            reported: 0,
            error: None,
        }
    }

    /// Also record each reported socket's occupancy in `history`
    #[must_use]
    pub fn with_history(mut self, history: HistoryManager) -> Self {
        self.history = Some(history);
        self
    }

    /// Lines written so far
    #[must_use]
    pub const fn reported(&self) -> usize {
        self.reported
    }

    #[must_use]
    pub const fn history(&self) -> Option<&HistoryManager> {
        self.history.as_ref()
    }

    pub fn history_mut(&mut self) -> Option<&mut HistoryManager> {
        self.history.as_mut()
    }

    /// First write failure, if any, clearing it
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    /// Flush the output at the end of a round
    ///
    /// # Errors
    ///
    /// The underlying writer's flush error.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Exit summaries of every tracked pair, text or JSON per the output mode
    ///
    /// # Errors
    ///
    /// Write or serialization failures.
    pub fn write_history_summaries(&mut self) -> io::Result<()> {
        let Some(manager) = &self.history else {
            return Ok(());
        };

        let mut pairs: Vec<_> = manager.iter().collect();
        pairs.sort_by_key(|(pair, _)| **pair);
        for ((local, remote), history) in pairs {
            let summary = HistorySummary::new(*local, *remote, history, &self.prefs);
            if self.json {
                serde_json::to_writer(&mut self.out, &summary)?;
                writeln!(self.out)?;
            } else {
                writeln!(self.out, "{}", summary.to_text())?;
            }
        }
        self.out.flush()
    }

    fn write_entry(&mut self, entry: &SocketEntry, timestamp: RoundTimestamp) -> io::Result<()> {
        if self.json {
            serde_json::to_writer(&mut self.out, &ReportRecord::new(entry, timestamp, &self.prefs))?;
            writeln!(self.out)
        } else {
            writeln!(self.out, "{}", format_report(entry, timestamp, &self.prefs))
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: io::Write> EntrySink for Reporter<W> {
    fn accept(&mut self, entry: &SocketEntry, timestamp: RoundTimestamp) {
        if self.error.is_some() || !exceeds_threshold(entry, &self.prefs) {
            return;
        }

        if let Err(e) = self.write_entry(entry, timestamp) {
            self.error = Some(e);
            return;
        }
        self.reported += 1;

        if let Some(history) = &mut self.history {
            history.add_sample(entry.local, entry.remote, timestamp, occupancy(entry, &self.prefs));
        }
    }
}
