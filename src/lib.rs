// ============================================================================
// QUEUE OCCUPANCY MONITOR LIBRARY
// ============================================================================
// Watches the send and receive queues of every TCP and UDP socket on a Linux
// host by polling the kernel's text socket tables:
//
//   /proc/net/udp   /proc/net/udp6   /proc/net/tcp   /proc/net/tcp6
//
// === KEY FEATURES ===
// 1. Stream each table through one fixed buffer, whatever its size
// 2. Decode the kernel's hex address and queue columns without allocating
// 3. Report sockets whose queues reach a threshold, as text or JSON
// 4. Keep a bounded per-socket history of reported occupancy
//
// === ONE POLLING ROUND ===
// ProcNetTables::poll_round() reads every selected table once and hands each
// decoded SocketEntry, stamped with the round's timestamp, to an EntrySink.
// The binary's sink is output::Reporter.

// === MODULE DECLARATIONS ===
pub mod history;
pub mod output;
pub mod preferences;
pub mod procnet;

pub use history::{Event, History, HistoryManager, Sample};
pub use output::{Reporter, exceeds_threshold, format_report, format_report_json};
pub use preferences::Preferences;
pub use procnet::{
    EntrySink, ProcNetError, ProcNetTables, RoundSummary, RoundTimestamp, SocketEntry,
    SyntaxError,
};

// ============================================================================
// CONSTANTS: PROCESS BEHAVIOUR
// ============================================================================

/// Exit status after a failed polling round (unreadable or malformed table)
pub const EXIT_ROUND_FAILURE: u8 = 3;

/// Rounds without a report after which a socket pair's history is dropped
///
/// 6000 rounds is one minute at the default 10 ms sleep.
pub const FORGET_IDLE_ROUNDS: u64 = 6000;

#[cfg(test)]
mod tests;
