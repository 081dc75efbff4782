//! `/proc/net` socket table access
//!
//! Reads the kernel's text socket tables (`tcp`, `tcp6`, `udp`, `udp6`) and
//! delivers one `SocketEntry` per socket row to a caller-supplied sink.
//!
//! # Architecture
//!
//! ```text
//! registry   which tables, which handles, one timestamp per round
//!    |
//! reader     rolling buffer, splits a table into lines
//!    |
//! line       one row -> SocketEntry (or skipped by the port filter)
//!    |
//! decode     hex address:port pairs and hex queue sizes
//!    |
//! scanner    spaces, delimiters, digit runs
//! ```
//!
//! Nothing below the registry touches the filesystem, so every layer can be
//! exercised from an in-memory byte slice.
//!
//! # Educational Notes
//!
//! ## Push Instead of Collect
//!
//! A round does not build a `Vec<SocketEntry>`. Each entry is handed to the
//! sink as soon as its row is decoded and is dropped right after. Memory use
//! stays at one read buffer no matter how many sockets the host has.

// ============================================================================
// SUBMODULE DECLARATIONS
// ============================================================================

pub mod decode; // hex address and queue decoding
pub mod line; // one row into one SocketEntry
pub mod reader; // rolling-buffer table reader
pub mod registry; // table set and round dispatcher
pub mod scanner; // cursor over one line

// ============================================================================
// PUBLIC RE-EXPORTS
// ============================================================================

pub use line::{SocketEntry, parse_line};
pub use reader::{DEFAULT_BUFFER_SIZE, ProcNetError, read_table};
pub use registry::{
    AddressFamily, EntrySink, PROC_NET_ROOT, ProcNetTables, RoundSummary, RoundTimestamp,
    TableSource, TransportProtocol,
};
pub use scanner::{Cursor, SyntaxError};
