//! `rdt`: the receiving side of a TCP-like reliable data transport.
//!
//! # Architecture
//!
//! ```text
//!  UdpNetwork / Simulator ──Segment──┐
//!                                    ├──▶ Host ──▶ Demultiplexer ──▶ Connection ──▶ app callback
//!  TokioTimers ────────────Timeout───┘                                   │
//!        ▲                                                               │
//!        └────────── schedule / cancel ◀─────────────────────────────────┤
//!                                                                        ▼
//!                                                              Network::send
//! ```
//!
//! The protocol core ([`demux`], [`connection`]) is sans-IO: it only calls
//! the [`network::Network`] and [`timer::Timers`] traits.  [`host::Host`]
//! serialises every inbound segment and timer expiry through one channel so
//! handlers never overlap.
//!
//! - [`segment`]: 20-byte header codec and pseudo-header checksum
//! - [`demux`]: listening port, passive handshake, connection table
//! - [`connection`]: cumulative ACK, MSS segmentation, retransmission
//! - [`rtt`]: smoothed RTT / deviation / timeout interval
//! - [`congestion`]: additive-increase, halve-on-timeout window
//! - [`timer`]: timer trait and the tokio implementation
//! - [`state`]: connection lifecycle states
//! - [`host`]: event loop
//! - [`socket`]: UDP substrate
//! - [`simulator`]: lossy in-process substrate for testing

pub mod config;
pub mod congestion;
pub mod connection;
pub mod demux;
pub mod error;
pub mod host;
pub mod network;
pub mod rtt;
pub mod segment;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use connection::{Connection, ConnectionId};
pub use demux::{Demultiplexer, Disposition};
pub use error::{Discard, Error};
pub use host::{Event, Host};
pub use network::Network;
