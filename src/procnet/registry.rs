//! Table registry and per-round dispatcher
//!
//! # The Four Tables
//!
//! | File              | Family | Protocol |
//! |-------------------|--------|----------|
//! | `/proc/net/udp`   | IPv4   | UDP      |
//! | `/proc/net/udp6`  | IPv6   | UDP      |
//! | `/proc/net/tcp`   | IPv4   | TCP      |
//! | `/proc/net/tcp6`  | IPv6   | TCP      |
//!
//! # One Round
//!
//! 1. Capture one `RoundTimestamp`
//! 2. For each table the preferences are interested in, read it
//! 3. Stop at the first failing table and return its error
//!
//! Every entry of a round carries the same timestamp, so consumers can
//! group entries by round just by comparing timestamps.
//!
//! # Handle Ownership
//!
//! Each `TableSource` owns its open `File` (if any). With the default policy
//! the file stays open between rounds and is rewound with `seek(0)`; with
//! `close_after_reading` it is dropped after every round and reopened next
//! time. No global state is involved.

use std::fmt;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use super::line::SocketEntry;
use super::reader::{DEFAULT_BUFFER_SIZE, ProcNetError, read_table};
use crate::preferences::Preferences;

/// Directory holding the kernel's socket tables
pub const PROC_NET_ROOT: &str = "/proc/net";

/// Wall-clock time of one polling round, shared by all its entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoundTimestamp(SystemTime);

impl RoundTimestamp {
    #[must_use]
    pub fn now() -> Self {
        Self(SystemTime::now())
    }

    #[must_use]
    pub const fn as_system_time(&self) -> SystemTime {
        self.0
    }
}

impl From<SystemTime> for RoundTimestamp {
    fn from(time: SystemTime) -> Self {
        Self(time)
    }
}

/// Receiver of decoded entries
///
/// Called once per decoded, filter-passing entry. Anything the consumer
/// needs (output handle, history, counters) lives in the implementor, or is
/// captured by the closure: every `FnMut(&SocketEntry, RoundTimestamp)` is a
/// sink.
pub trait EntrySink {
    fn accept(&mut self, entry: &SocketEntry, timestamp: RoundTimestamp);
}

impl<F> EntrySink for F
where
    F: FnMut(&SocketEntry, RoundTimestamp),
{
    #[inline]
    fn accept(&mut self, entry: &SocketEntry, timestamp: RoundTimestamp) {
        self(entry, timestamp);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Inet,
    Inet6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inet => "IPv4",
            Self::Inet6 => "IPv6",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        })
    }
}

/// One well-known table file and its (optionally persistent) handle
#[derive(Debug)]
pub struct TableSource {
    path: PathBuf,
    family: AddressFamily,
    protocol: TransportProtocol,
    handle: Option<File>,
}

impl TableSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, family: AddressFamily, protocol: TransportProtocol) -> Self {
        Self {
            path: path.into(),
            family,
            protocol,
            handle: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn family(&self) -> AddressFamily {
        self.family
    }

    #[must_use]
    pub const fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    /// Whether a handle is being kept open for the next round
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether the operator asked for this table's protocol and family
    #[must_use]
    pub fn is_relevant(&self, prefs: &Preferences) -> bool {
        prefs.wants_protocol(self.protocol) && prefs.wants_family(self.family)
    }

    /// Reuse the kept handle rewound to the start, or open the file
    fn acquire(&mut self) -> Result<File, ProcNetError> {
        match self.handle.take() {
            Some(mut file) => {
                file.seek(SeekFrom::Start(0))
                    .map_err(|e| ProcNetError::io(&self.path, e))?;
                Ok(file)
            }
            None => File::open(&self.path).map_err(|e| ProcNetError::io(&self.path, e)),
        }
    }

    /// Read the whole table once, returning the number of entries delivered
    ///
    /// On success the handle is kept for the next round unless
    /// `close_after_reading` is set. On failure it is always dropped.
    ///
    /// # Errors
    ///
    /// Whatever opening, rewinding or [`read_table`] reports.
    pub fn read_round<S>(
        &mut self,
        buf: &mut [u8],
        prefs: &Preferences,
        timestamp: RoundTimestamp,
        sink: &mut S,
    ) -> Result<usize, ProcNetError>
    where
        S: EntrySink + ?Sized,
    {
        let mut file = self.acquire()?;
        let delivered = read_table(&mut file, buf, &self.path, prefs, timestamp, sink)?;
        if !prefs.close_after_reading {
            self.handle = Some(file);
        }
        Ok(delivered)
    }
}

/// Outcome of one successful round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSummary {
    pub timestamp: RoundTimestamp,
    /// Tables read this round
    pub sources: usize,
    /// Entries delivered to the sink
    pub entries: usize,
}

/// The fixed set of socket tables plus the shared read buffer
#[derive(Debug)]
pub struct ProcNetTables {
    sources: Vec<TableSource>,
    buffer: Box<[u8]>,
}

impl ProcNetTables {
    /// Tables under `/proc/net` with the default buffer size
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(PROC_NET_ROOT)
    }

    /// Tables under another directory, e.g. a fixture directory in tests
    #[must_use]
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        use AddressFamily::{Inet, Inet6};
        use TransportProtocol::{Tcp, Udp};

        let root = root.as_ref();
        let sources = [
            ("udp", Inet, Udp),
            ("udp6", Inet6, Udp),
            ("tcp", Inet, Tcp),
            ("tcp6", Inet6, Tcp),
        ]
        .into_iter()
        .map(|(name, family, protocol)| TableSource::new(root.join(name), family, protocol))
        .collect();

        Self {
            sources,
            buffer: vec![0; DEFAULT_BUFFER_SIZE].into_boxed_slice(),
        }
    }

    /// Replace the read buffer; its size bounds the longest accepted line
    ///
    /// A size of zero is raised to one byte.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer = vec![0; size.max(1)].into_boxed_slice();
        self
    }

    #[must_use]
    pub fn sources(&self) -> &[TableSource] {
        &self.sources
    }

    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Run one polling round over every relevant table
    ///
    /// # Errors
    ///
    /// The first table failure; the remaining tables are not read and
    /// entries already delivered this round are not retracted.
    pub fn poll_round<S>(&mut self, prefs: &Preferences, sink: &mut S) -> Result<RoundSummary, ProcNetError>
    where
        S: EntrySink + ?Sized,
    {
        let timestamp = RoundTimestamp::now();
        let mut summary = RoundSummary {
            timestamp,
            sources: 0,
            entries: 0,
        };

        for source in self.sources.iter_mut().filter(|s| s.is_relevant(prefs)) {
            let delivered = source.read_round(&mut self.buffer, prefs, timestamp, sink)?;
            debug!(
                table = %source.path().display(),
                family = %source.family(),
                protocol = %source.protocol(),
                entries = delivered,
                "table read"
            );
            summary.sources += 1;
            summary.entries += delivered;
        }

        Ok(summary)
    }
}

impl Default for ProcNetTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process;

    const TCP: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:0050 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 100 1 0000000000000000 100 0 0 10 0
   1: 0100007F:0050 0100007F:A1B2 01 00000000:00001000 00:00000000 00000000     0        0 101 1 0000000000000000 20 4 30 10 -1
";
    const TCP6: &str = "  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000000000000000000001000000:1F90 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 200 1 0000000000000000 100 0 0 10 0
";
    const UDP: &str = "   sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode ref pointer drops
  100: 00000000:14E9 00000000:0000 07 00000000:00000300 00:00000000 00000000   106        0 300 2 0000000000000000 0
";
    const UDP6: &str = "  sl  local_address                         remote_address                        st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode ref pointer drops
";

    /// Fixture directory with the four tables, unique per test
    fn fixture(name: &str, tcp: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("qui-registry-{}-{name}", process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("tcp"), tcp).unwrap();
        fs::write(dir.join("tcp6"), TCP6).unwrap();
        fs::write(dir.join("udp"), UDP).unwrap();
        fs::write(dir.join("udp6"), UDP6).unwrap();
        dir
    }

    fn poll(tables: &mut ProcNetTables, prefs: &Preferences) -> (Result<RoundSummary, ProcNetError>, Vec<(SocketEntry, RoundTimestamp)>) {
        let mut seen = Vec::new();
        let mut sink = |entry: &SocketEntry, ts: RoundTimestamp| seen.push((*entry, ts));
        let result = tables.poll_round(prefs, &mut sink);
        (result, seen)
    }

    #[test]
    fn test_registry_order_and_paths() {
        let tables = ProcNetTables::new();
        let names: Vec<_> = tables
            .sources()
            .iter()
            .map(|s| (s.path().to_path_buf(), s.family(), s.protocol()))
            .collect();
        assert_eq!(
            names,
            vec![
                (PathBuf::from("/proc/net/udp"), AddressFamily::Inet, TransportProtocol::Udp),
                (PathBuf::from("/proc/net/udp6"), AddressFamily::Inet6, TransportProtocol::Udp),
                (PathBuf::from("/proc/net/tcp"), AddressFamily::Inet, TransportProtocol::Tcp),
                (PathBuf::from("/proc/net/tcp6"), AddressFamily::Inet6, TransportProtocol::Tcp),
            ]
        );
        assert_eq!(tables.buffer_size(), DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_round_reads_all_tables_with_one_timestamp() {
        let dir = fixture("all", TCP);
        let mut tables = ProcNetTables::with_root(&dir);
        let (result, seen) = poll(&mut tables, &Preferences::default().normalized());
        let summary = result.unwrap();

        assert_eq!(summary.sources, 4);
        assert_eq!(summary.entries, 4);
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|(_, ts)| *ts == summary.timestamp));

        // Registry order: udp, udp6 (empty), tcp, tcp6
        assert_eq!(seen[0].0.local.port(), 5353);
        assert_eq!(seen[2].0.inbound_queue, 0x1000);
        assert_eq!(seen[3].0.local.port(), 8080);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_interest_filtering() {
        let dir = fixture("interest", TCP);
        let mut tables = ProcNetTables::with_root(&dir);
        let prefs = Preferences {
            want_tcp: true,
            want_ipv6: true,
            ..Preferences::default()
        }
        .normalized();

        let (result, seen) = poll(&mut tables, &prefs);
        assert_eq!(result.unwrap().sources, 1);
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.local.is_ipv6());

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_handles_kept_or_closed_by_policy() {
        let dir = fixture("policy", TCP);
        let mut tables = ProcNetTables::with_root(&dir);

        let keep = Preferences::default().normalized();
        let (first, _) = poll(&mut tables, &keep);
        first.unwrap();
        assert!(tables.sources().iter().all(TableSource::is_open));

        // Rewound handle sees the same content again
        let (second, seen) = poll(&mut tables, &keep);
        assert_eq!(second.unwrap().entries, 4);
        assert_eq!(seen.len(), 4);

        let close = Preferences {
            close_after_reading: true,
            ..keep
        };
        let (third, _) = poll(&mut tables, &close);
        third.unwrap();
        assert!(tables.sources().iter().all(|s| !s.is_open()));

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_failure_aborts_round() {
        let bad_tcp = "sl\n   0: 0100007F:0050 00000000:0000 0A 00000000:00000000\n   1: 0000000000000000:0050 00000000:0000 0A 00000000:00000000\n";
        let dir = fixture("abort", bad_tcp);
        let mut tables = ProcNetTables::with_root(&dir);
        let (result, seen) = poll(&mut tables, &Preferences::default().normalized());

        let err = result.unwrap_err();
        assert_eq!(err.path(), dir.join("tcp"));
        assert!(matches!(err, ProcNetError::Syntax { line: 3, .. }));
        // udp and the first tcp row were delivered before the failure
        assert_eq!(seen.len(), 2);
        // tcp6 was never reached, tcp dropped its handle
        assert!(!tables.sources()[2].is_open());
        assert!(!tables.sources()[3].is_open());

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_table_is_io_error() {
        let dir = fixture("missing", TCP);
        fs::remove_file(dir.join("udp6")).unwrap();
        let mut tables = ProcNetTables::with_root(&dir);
        let (result, _) = poll(&mut tables, &Preferences::default().normalized());

        match result.unwrap_err() {
            ProcNetError::Io { path, source } => {
                assert_eq!(path, dir.join("udp6"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_buffer_too_small_for_rows() {
        let dir = fixture("small", TCP);
        let mut tables = ProcNetTables::with_root(&dir).with_buffer_size(48);
        let (result, seen) = poll(&mut tables, &Preferences::default().normalized());

        assert!(matches!(
            result.unwrap_err(),
            ProcNetError::BufferExhausted { capacity: 48, .. }
        ));
        assert!(seen.is_empty());

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_port_filter_round() {
        let dir = fixture("port", TCP);
        let mut tables = ProcNetTables::with_root(&dir);
        let prefs = Preferences {
            port: Some(80),
            ..Preferences::default()
        }
        .normalized();

        let (result, seen) = poll(&mut tables, &prefs);
        assert_eq!(result.unwrap().entries, 2);
        assert!(seen.iter().all(|(e, _)| e.involves_port(80)));

        fs::remove_dir_all(dir).ok();
    }
}
