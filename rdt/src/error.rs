//! Error types.
//!
//! Inbound problems never propagate out of the protocol layer: a bad segment
//! is dropped and the sender's retransmission timer recovers.  [`Discard`]
//! names the reason so it can be logged and inspected by tests.  [`Error`]
//! covers the I/O driver surfaces, which can genuinely fail.

use std::net::SocketAddr;

use crate::connection::ConnectionId;
use crate::segment::HeaderError;

/// Why an inbound segment was dropped without effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Discard {
    #[error("malformed segment: {0}")]
    Malformed(#[from] HeaderError),
    #[error("segment for port {got}, listening on {listening}")]
    PortMismatch { listening: u16, got: u16 },
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("{0} (segment for unknown connection)")]
    UnknownConnection(ConnectionId),
    #[error("out of sequence: expected seq {expected}, got {got}")]
    OutOfSequence { expected: u32, got: u32 },
}

/// Errors surfaced by the network drivers and the binary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is not an IPv4 address")]
    NonIpv4(SocketAddr),
}
