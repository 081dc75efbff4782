//! Operator preferences shared by the table reader, the reporter and the
//! polling loop
//!
//! The command line fills a `Preferences`; the library only reads it.
//!
//! # Selection Dimensions
//!
//! Protocol (TCP/UDP), family (IPv4/IPv6) and direction (input/output) are
//! each a pair of flags. Selecting nothing in a dimension means selecting
//! everything in it, so `qui` with no flags watches every table and both
//! queues. `normalized()` applies that rule once, up front.

use std::time::Duration;

use crate::procnet::{AddressFamily, TransportProtocol};

/// Queue size (bytes) at which a socket is reported
pub const DEFAULT_THRESHOLD: u32 = 2000;

/// Bytes represented by one blip in the bar after a queue size
pub const DEFAULT_BLIP_SIZE: u32 = 50_000;

/// Pause between polling rounds
pub const DEFAULT_SLEEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub want_tcp: bool,
    pub want_udp: bool,
    pub want_ipv4: bool,
    pub want_ipv6: bool,
    /// Only sockets with this local or remote port
    pub port: Option<u16>,

    /// Check and print the receive queue
    pub want_input: bool,
    /// Check and print the send queue
    pub want_output: bool,
    /// Microsecond timestamps instead of milliseconds
    pub print_usecs: bool,
    pub threshold: u32,
    /// Always > 0
    pub blip_size: u32,
    pub sleep: Duration,

    /// Reopen every table each round instead of rewinding a kept handle
    pub close_after_reading: bool,
    /// Log table headers and per-table progress
    pub debug: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            want_tcp: false,
            want_udp: false,
            want_ipv4: false,
            want_ipv6: false,
            port: None,
            want_input: false,
            want_output: false,
            print_usecs: false,
            threshold: DEFAULT_THRESHOLD,
            blip_size: DEFAULT_BLIP_SIZE,
            sleep: DEFAULT_SLEEP,
            close_after_reading: false,
            debug: false,
        }
    }
}

impl Preferences {
    /// Turn every empty selection dimension into "all of it"
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if !self.want_tcp && !self.want_udp {
            self.want_tcp = true;
            self.want_udp = true;
        }
        if !self.want_ipv4 && !self.want_ipv6 {
            self.want_ipv4 = true;
            self.want_ipv6 = true;
        }
        if !self.want_input && !self.want_output {
            self.want_input = true;
            self.want_output = true;
        }
        self
    }

    #[must_use]
    pub const fn wants_protocol(&self, protocol: TransportProtocol) -> bool {
        match protocol {
            TransportProtocol::Tcp => self.want_tcp,
            TransportProtocol::Udp => self.want_udp,
        }
    }

    #[must_use]
    pub const fn wants_family(&self, family: AddressFamily) -> bool {
        match family {
            AddressFamily::Inet => self.want_ipv4,
            AddressFamily::Inet6 => self.want_ipv6,
        }
    }
}
