//! Connection lifecycle states.
//!
//! ```text
//!   SYN accepted            local close()
//!  ──────────────▶  OPEN  ────────────────▶  CLOSED
//! ```
//!
//! There is no half-closed state.  A peer FIN is acknowledged and reported to
//! the application but leaves the connection `Open`; only a local
//! [`Connection::close`](crate::connection::Connection::close) moves it to
//! `Closed`, after which the demultiplexer forgets it.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Created by the handshake; all segment handling applies.
    #[default]
    Open,
    /// Closed locally; segments for this id are treated as unknown.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("OPEN"),
            Self::Closed => f.write_str("CLOSED"),
        }
    }
}
