//! Streaming reader for one socket table file
//!
//! # The Problem
//!
//! A busy host can have tens of thousands of sockets, so a table file can be
//! megabytes long. Each row, though, is short (about 150 bytes for TCP, 180
//! for TCP6). The reader keeps one fixed buffer and never holds more than
//! one buffer's worth of the file.
//!
//! # Rolling Buffer
//!
//! ```text
//!  after a read:   [ row | row | row | partial row ]
//!                                     ^pos          ^limit
//!  compacted:      [ partial row | .............. ]
//!                  ^pos          ^limit
//!  next read:      [ partial row + rest | row | ...]
//! ```
//!
//! A row that straddles two read calls is moved to the buffer start and the
//! next read appends after it. A row that cannot fit even in an empty buffer
//! is reported as `BufferExhausted` instead of being cut and misparsed.

use std::io::{self, Read};
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::line::parse_line;
use super::registry::{EntrySink, RoundTimestamp};
use super::scanner::{Cursor, SyntaxError};
use crate::preferences::Preferences;

/// Default read buffer size
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Failure while reading one table, which aborts the whole polling round
#[derive(Debug, thiserror::Error)]
pub enum ProcNetError {
    /// A row could not be decoded
    #[error("{}: line {line}: {source}", path.display())]
    Syntax {
        path: PathBuf,
        /// 1-based, the header is line 1
        line: usize,
        #[source]
        source: SyntaxError,
    },

    /// Open, seek or read failed
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A single line does not fit in the read buffer
    #[error("{}: line longer than the {capacity}-byte read buffer", path.display())]
    BufferExhausted { path: PathBuf, capacity: usize },
}

impl ProcNetError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Table file the failure belongs to
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Syntax { path, .. } | Self::Io { path, .. } | Self::BufferExhausted { path, .. } => {
                path
            }
        }
    }
}

/// One read call, retried on `EINTR`
fn read_some<R: Read + ?Sized>(reader: &mut R, dst: &mut [u8], path: &Path) -> Result<usize, ProcNetError> {
    loop {
        match reader.read(dst) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(ProcNetError::io(path, e)),
        }
    }
}

/// Rolling line splitter over a caller-owned buffer
struct LineBuffer<'r, 'b, R: ?Sized> {
    reader: &'r mut R,
    buf: &'b mut [u8],
    path: &'b Path,
    /// Start of the unconsumed data
    pos: usize,
    /// End of the valid data
    limit: usize,
    /// Lines handed out so far
    line_no: usize,
}

impl<'r, 'b, R: Read + ?Sized> LineBuffer<'r, 'b, R> {
    /// First read of the round; an empty table is an error because a header
    /// line is always expected
    fn prime(reader: &'r mut R, buf: &'b mut [u8], path: &'b Path) -> Result<Self, ProcNetError> {
        let limit = read_some(reader, buf, path)?;
        if limit == 0 {
            return Err(ProcNetError::io(
                path,
                io::Error::new(io::ErrorKind::UnexpectedEof, "nothing to read"),
            ));
        }
        Ok(Self {
            reader,
            buf,
            path,
            pos: 0,
            limit,
            line_no: 0,
        })
    }

    /// Range of the next complete line (newline excluded), `None` at end of
    /// table
    fn next_line(&mut self) -> Result<Option<Range<usize>>, ProcNetError> {
        loop {
            if let Some(offset) = self.buf[self.pos..self.limit]
                .iter()
                .position(|&b| b == b'\n')
            {
                let line = self.pos..self.pos + offset;
                self.pos = line.end + 1;
                self.line_no += 1;
                return Ok(Some(line));
            }

            if self.pos == self.limit {
                // Buffer consumed exactly: the table ends unless more arrives
                self.pos = 0;
                self.limit = read_some(self.reader, self.buf, self.path)?;
                if self.limit == 0 {
                    return Ok(None);
                }
                continue;
            }

            if self.pos == 0 && self.limit == self.buf.len() {
                return Err(ProcNetError::BufferExhausted {
                    path: self.path.to_path_buf(),
                    capacity: self.buf.len(),
                });
            }

            // Partial line: move it to the front and append the next read
            self.buf.copy_within(self.pos..self.limit, 0);
            self.limit -= self.pos;
            self.pos = 0;
            let n = read_some(self.reader, &mut self.buf[self.limit..], self.path)?;
            if n == 0 {
                return Err(ProcNetError::io(
                    self.path,
                    io::Error::new(io::ErrorKind::UnexpectedEof, "table ends inside a line"),
                ));
            }
            self.limit += n;
        }
    }
}

fn log_header(path: &Path, header: &[u8]) {
    let mut cursor = Cursor::new(header);
    loop {
        cursor.skip_spaces();
        let column = cursor.position();
        let Some(name) = cursor.scan_token() else {
            break;
        };
        debug!(
            table = %path.display(),
            column,
            name = %String::from_utf8_lossy(name),
            "header column"
        );
    }
}

/// Read one whole table from `reader`, delivering each entry to `sink`
///
/// `buf` is the rolling buffer; its length bounds the longest accepted line.
/// Returns the number of entries delivered. The first malformed row aborts
/// the table.
///
/// # Errors
///
/// - `Io` on a failed read, an empty table or a truncated last line
/// - `BufferExhausted` if a line (header included) exceeds `buf`
/// - `Syntax` for the first row that does not decode
pub fn read_table<R, S>(
    reader: &mut R,
    buf: &mut [u8],
    path: &Path,
    prefs: &Preferences,
    timestamp: RoundTimestamp,
    sink: &mut S,
) -> Result<usize, ProcNetError>
where
    R: Read + ?Sized,
    S: EntrySink + ?Sized,
{
    let mut lines = LineBuffer::prime(reader, buf, path)?;

    // === HEADER LINE ===
    let Some(header) = lines.next_line()? else {
        return Ok(0);
    };
    if prefs.debug {
        log_header(path, &lines.buf[header]);
    }

    // === ROWS ===
    let mut delivered = 0;
    while let Some(range) = lines.next_line()? {
        let row = &lines.buf[range];
        match parse_line(row, prefs.port) {
            Ok(Some(entry)) => {
                sink.accept(&entry, timestamp);
                delivered += 1;
            }
            Ok(None) => {}
            Err(source) => {
                return Err(ProcNetError::Syntax {
                    path: path.to_path_buf(),
                    line: lines.line_no,
                    source,
                });
            }
        }
    }

    Ok(delivered)
}
