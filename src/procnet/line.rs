//! One socket table row into one `SocketEntry`
//!
//! # Row Layout
//!
//! ```text
//!   sl  local_address rem_address   st tx_queue rx_queue tr tm->when ...
//!    0: 0100007F:0CEA 00000000:0000 0A 00000000:00000000 00:00000000 ...
//!    ^  ^             ^             ^  ^        ^
//!    |  |             |             |  |        inbound (receive) queue
//!    |  |             |             |  outbound (send) queue
//!    |  |             |             status (not interpreted)
//!    |  |             remote address:port
//!    |  local address:port
//!    slot index (not interpreted)
//! ```
//!
//! Columns after the inbound queue are ignored. The UDP tables share the
//! same leading columns.

use std::net::SocketAddr;

use serde::Serialize;

use super::decode::{decode_hex_u32, decode_socket_address};
use super::scanner::{Cursor, SyntaxError};

/// Queue occupancy of one socket, as decoded from one table row
///
/// Ephemeral: built per row, handed to the sink by reference, dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SocketEntry {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    /// Bytes waiting in the receive queue (`rx_queue`)
    pub inbound_queue: u32,
    /// Bytes waiting in the send queue (`tx_queue`)
    pub outbound_queue: u32,
}

impl SocketEntry {
    /// Whether either end of the socket uses `port`
    #[inline]
    #[must_use]
    pub fn involves_port(&self, port: u16) -> bool {
        self.local.port() == port || self.remote.port() == port
    }
}

/// Parse one row (without its trailing newline)
///
/// Returns `Ok(None)` when `port_filter` is set and neither the local nor
/// the remote port matches it. That is a skip, not an error: the status and
/// queue columns of such rows are never looked at.
///
/// # Errors
///
/// The first `SyntaxError` met while scanning left to right.
pub fn parse_line(line: &[u8], port_filter: Option<u16>) -> Result<Option<SocketEntry>, SyntaxError> {
    let mut cursor = Cursor::new(line);

    // === SLOT INDEX ===
    cursor.skip_spaces();
    cursor.scan_decimal_run()?;
    cursor.skip_delimiter(b':')?;
    cursor.skip_delimiter(b' ')?;
    cursor.skip_spaces();

    // === ADDRESSES ===
    let local = decode_socket_address(&mut cursor)?;
    cursor.skip_spaces();
    let remote = decode_socket_address(&mut cursor)?;
    cursor.skip_spaces();

    // === PORT FILTER CHECKPOINT ===
    if let Some(port) = port_filter
        && local.port() != port
        && remote.port() != port
    {
        return Ok(None);
    }

    // === STATUS AND QUEUES ===
    cursor.scan_hex_run()?;
    cursor.skip_spaces();
    let outbound_queue = decode_hex_u32(&mut cursor)?;
    cursor.skip_delimiter(b':')?;
    let inbound_queue = decode_hex_u32(&mut cursor)?;

    Ok(Some(SocketEntry {
        local,
        remote,
        inbound_queue,
        outbound_queue,
    }))
}
