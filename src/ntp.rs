// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # NTP Client
//!
//! A single SNTP-style query against one time server: one 48-byte client
//! packet out, one reply in. Only the reply's transmit timestamp is used;
//! this is a clock sanity check, not a synchronisation algorithm.
//!
//! ## Packet
//!
//! The request is all zeroes except the first byte, `0x1B`:
//! leap indicator 0, version 3, mode 3 (client). The transmit timestamp
//! lives at bytes 40..48 of the reply as 32-bit seconds since
//! 1900-01-01T00:00:00Z followed by a 32-bit binary fraction.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::net::{lookup_host, UdpSocket};

/// Default time server.
pub const DEFAULT_NTP_SERVER: &str = "pool.ntp.org:123";

/// Default bound on DNS + send + receive.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Size of a client request and of the minimal server reply.
pub const PACKET_SIZE: usize = 48;

/// LI = 0, VN = 3, Mode = 3.
const CLIENT_HEADER: u8 = 0x1B;

const TRANSMIT_TIMESTAMP_OFFSET: usize = 40;

/// Seconds between the NTP era 0 epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET_SECS: i64 = 2_208_988_800;

#[derive(Debug, thiserror::Error)]
pub enum NtpError {
    #[error("timed out after {0:?} waiting for NTP response")]
    Timeout(Duration),

    #[error("NTP transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("could not resolve NTP server {0}")]
    Unresolved(String),

    #[error("NTP reply too short: {received} bytes")]
    ShortReply { received: usize },

    #[error("NTP transmit timestamp out of range")]
    InvalidTimestamp,
}

/// Build the fixed client request packet.
pub fn request_packet() -> [u8; PACKET_SIZE] {
    let mut packet = [0u8; PACKET_SIZE];
    packet[0] = CLIENT_HEADER;
    packet
}

/// Decode the transmit timestamp of a server reply into UTC.
///
/// Sub-millisecond precision is truncated.
pub fn decode_transmit_time(reply: &[u8]) -> Result<DateTime<Utc>, NtpError> {
    if reply.len() < PACKET_SIZE {
        return Err(NtpError::ShortReply {
            received: reply.len(),
        });
    }

    let field = &reply[TRANSMIT_TIMESTAMP_OFFSET..TRANSMIT_TIMESTAMP_OFFSET + 8];
    let seconds = be_u32(&field[..4]);
    let fraction = be_u32(&field[4..]);

    let millis = i64::from(seconds) * 1000 + ((u64::from(fraction) * 1000) >> 32) as i64;

    DateTime::<Utc>::from_timestamp_millis(millis - NTP_UNIX_OFFSET_SECS * 1000)
        .ok_or(NtpError::InvalidTimestamp)
}

fn be_u32(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

/// One-shot NTP client bound to a server address.
#[derive(Debug, Clone)]
pub struct NtpClient {
    server: String,
    timeout: Duration,
}

impl NtpClient {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Query the server once and return its transmit time.
    ///
    /// The socket lives inside the exchange future, so it is released on
    /// success, on error and when the timeout drops the future.
    pub async fn fetch_network_time(&self) -> Result<DateTime<Utc>, NtpError> {
        tokio::time::timeout(self.timeout, self.exchange())
            .await
            .map_err(|_| NtpError::Timeout(self.timeout))?
    }

    async fn exchange(&self) -> Result<DateTime<Utc>, NtpError> {
        let target = lookup_host(self.server.as_str())
            .await?
            .next()
            .ok_or_else(|| NtpError::Unresolved(self.server.clone()))?;

        let socket = UdpSocket::bind(bind_addr_for(&target)).await?;
        socket.connect(target).await?;
        socket.send(&request_packet()).await?;

        // Larger replies (extension fields) are accepted; only the header is read.
        let mut buf = [0u8; 1024];
        let received = socket.recv(&mut buf).await?;

        decode_transmit_time(&buf[..received])
    }
}

fn bind_addr_for(target: &SocketAddr) -> SocketAddr {
    match target {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], 0)),
    }
}
