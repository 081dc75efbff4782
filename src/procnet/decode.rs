//! Field decoding: hex `address:port` pairs and hex queue lengths
//!
//! # Kernel Encoding
//!
//! The kernel prints each address as the raw 32-bit words of the
//! network-order address, formatted with `%08X` on the host:
//!
//! ```text
//! 127.0.0.1 in memory (network order):  7F 00 00 01
//! read as a u32 on a little-endian host: 0x0100007F
//! printed:                              "0100007F"
//! ```
//!
//! Decoding reverses that: parse the hex word, then lay the word out in
//! host byte order (`to_ne_bytes`). IPv6 addresses are four such words
//! printed back to back, each handled the same way.
//!
//! Ports are printed with `%04X` from a host-order value, so the port hex is
//! just the port number.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use super::scanner::{Cursor, SyntaxError};

/// Hex characters encoding an IPv4 address
pub const IPV4_HEX_LEN: usize = 8;

/// Hex characters encoding an IPv6 address (four 32-bit words)
pub const IPV6_HEX_LEN: usize = 32;

const HEX_WORD_LEN: usize = 8;

/// Value of an all-hex-digit span, with overflow checking
///
/// `at` is the column of the span's first byte, used for errors.
fn hex_value(span: &[u8], at: usize) -> Result<u32, SyntaxError> {
    span.iter().enumerate().try_fold(0_u32, |acc, (i, &b)| {
        let digit = char::from(b)
            .to_digit(16)
            .ok_or(SyntaxError::NoHexDigits { at: at + i })?;
        acc.checked_mul(16)
            .and_then(|v| v.checked_add(digit))
            .ok_or(SyntaxError::Overflow { at })
    })
}

/// Decode a hex run under the cursor as a `u32`
///
/// Leading zeros are fine; more than 32 significant bits is not.
///
/// # Errors
///
/// `NoHexDigits` for an empty run, `Overflow` if the value exceeds `u32`.
#[inline]
pub fn decode_hex_u32(cursor: &mut Cursor<'_>) -> Result<u32, SyntaxError> {
    let at = cursor.position();
    let run = cursor.scan_hex_run()?;
    hex_value(run, at)
}

/// Decode `ADDRHEX:PORTHEX` under the cursor
///
/// Returns the raw address span (still hex) and the decoded port. The span
/// length decides the address family, see [`decode_address`].
///
/// # Errors
///
/// `NoHexDigits` if either run is empty, `ExpectedDelimiter` without the
/// `:`, `Overflow` if the port does not fit 16 bits.
pub fn decode_port_pair<'a>(cursor: &mut Cursor<'a>) -> Result<(&'a [u8], u16), SyntaxError> {
    let address = cursor.scan_hex_run()?;
    cursor.skip_delimiter(b':')?;

    let at = cursor.position();
    let port = decode_hex_u32(cursor)?;
    let port = u16::try_from(port).map_err(|_| SyntaxError::Overflow { at })?;

    Ok((address, port))
}

/// Build a socket address from its hex span and an already-decoded port
///
/// - 8 hex chars: IPv4, one word in host byte order
/// - 32 hex chars: IPv6, four words, each in host byte order
///
/// `at` is the column of the span, used for errors.
///
/// # Errors
///
/// `UnknownAddressLength` for any other span length, `NoHexDigits` if the
/// span holds a non-hex byte.
pub fn decode_address(span: &[u8], port: u16, at: usize) -> Result<SocketAddr, SyntaxError> {
    match span.len() {
        IPV4_HEX_LEN => {
            let word = hex_value(span, at)?;
            let ip = Ipv4Addr::from(word.to_ne_bytes());
            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }
        IPV6_HEX_LEN => {
            // Fixed-size result, filled word by word
            let mut octets = [0_u8; 16];
            for (k, (chunk, out)) in span
                .chunks_exact(HEX_WORD_LEN)
                .zip(octets.chunks_exact_mut(4))
                .enumerate()
            {
                let word = hex_value(chunk, at + k * HEX_WORD_LEN)?;
                out.copy_from_slice(&word.to_ne_bytes());
            }
            let ip = Ipv6Addr::from(octets);
            Ok(SocketAddr::V6(SocketAddrV6::new(ip, port, 0, 0)))
        }
        len => Err(SyntaxError::UnknownAddressLength { len, at }),
    }
}

/// Decode a full `ADDRHEX:PORTHEX` field into a socket address
///
/// # Errors
///
/// Anything [`decode_port_pair`] or [`decode_address`] reports.
#[inline]
pub fn decode_socket_address(cursor: &mut Cursor<'_>) -> Result<SocketAddr, SyntaxError> {
    let at = cursor.position();
    let (span, port) = decode_port_pair(cursor)?;
    decode_address(span, port, at)
}
