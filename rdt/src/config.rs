//! Tunable parameters for a listening endpoint.

use std::time::Duration;

use crate::segment::MSS;

/// Parameters shared by the demultiplexer and every connection it accepts.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the demultiplexer accepts segments on.
    pub port: u16,
    /// Largest payload carried by one outbound segment.
    ///
    /// Connections clamp it to `1..=`[`MAX_MSS`](crate::segment::MAX_MSS).
    pub mss: usize,
    /// Retransmission timeout used before the first RTT sample.
    pub initial_timeout: Duration,
    /// Congestion window (in segments) of a freshly accepted connection.
    pub initial_window: u32,
    /// Drop segments whose checksum does not verify.
    ///
    /// Turning this off is only useful for tests and debugging.
    pub verify_checksum: bool,
}

impl Config {
    /// Default configuration listening on `port`.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 7000,
            mss: MSS,
            initial_timeout: Duration::from_secs(1),
            initial_window: 1,
            verify_checksum: true,
        }
    }
}
