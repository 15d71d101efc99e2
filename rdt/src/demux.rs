//! Inbound segment demultiplexing and the passive handshake.
//!
//! The [`Demultiplexer`] listens on one port and owns the table of open
//! connections keyed by [`ConnectionId`].  Every inbound segment goes through
//! [`Demultiplexer::on_segment`]:
//!
//! 1. read the header; drop it silently unless it targets the listening port,
//! 2. verify the checksum (unless disabled in [`Config`]),
//! 3. SYN → create a connection, answer SYN+ACK, notify the accept monitor,
//! 4. otherwise hand `(seq, ack, flags, payload)` to the matching connection,
//!    or drop it as belonging to an unknown connection.
//!
//! Nothing here ever fails towards the caller.  Dropped segments are logged
//! and reported as [`Disposition::Discarded`]; the peer's retransmission timer
//! is the only recovery mechanism.  No RST is ever sent.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::rc::Rc;

use rand::Rng;

use crate::config::Config;
use crate::connection::{Connection, ConnectionId};
use crate::error::Discard;
use crate::network::Network;
use crate::segment::{self, calc_checksum, flags, read_header};
use crate::timer::{TimerHandle, Timers};

/// Application handler for newly accepted connections.
pub type AcceptCallback = Box<dyn FnMut(&mut Connection)>;

/// What became of one inbound segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// A SYN created (or replaced) this connection.
    Accepted(ConnectionId),
    /// The segment was processed by this connection.
    Delivered(ConnectionId),
    /// The segment had no effect.
    Discarded(Discard),
}

/// Listening endpoint and owner of all its connections.
pub struct Demultiplexer {
    config: Config,
    network: Rc<dyn Network>,
    timers: Rc<dyn Timers>,
    connections: HashMap<ConnectionId, Connection>,
    on_accept: Option<AcceptCallback>,
}

impl Demultiplexer {
    pub fn new(config: Config, network: Rc<dyn Network>, timers: Rc<dyn Timers>) -> Self {
        Self {
            config,
            network,
            timers,
            connections: HashMap::new(),
            on_accept: None,
        }
    }

    /// Install the handler invoked once per accepted connection.
    pub fn register_accepted_connection_monitor<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Connection) + 'static,
    {
        self.on_accept = Some(Box::new(callback));
    }

    /// Sole inbound entry point: `raw` travelled from `src` to `dst`.
    pub fn on_segment(&mut self, raw: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> Disposition {
        let disposition = match self.route(raw, src, dst) {
            Ok(disposition) => disposition,
            Err(reason) => {
                match &reason {
                    Discard::PortMismatch { .. } => {}
                    Discard::OutOfSequence { .. } => log::trace!("[demux] {src}: {reason}"),
                    Discard::UnknownConnection(_) => log::warn!("[demux] {reason}"),
                    Discard::ChecksumMismatch | Discard::Malformed(_) => {
                        log::warn!("[demux] discarding segment from {src}: {reason}")
                    }
                }
                Disposition::Discarded(reason)
            }
        };
        self.reap();
        disposition
    }

    /// Deliver an expired retransmission timer.
    ///
    /// Ignored unless `handle` is still the connection's armed timer, so an
    /// expiry that raced with a cancel has no effect.
    pub fn on_timer(&mut self, id: ConnectionId, handle: TimerHandle) {
        match self.connections.get_mut(&id) {
            Some(conn) if conn.is_open() && conn.armed_timer() == Some(handle) => conn.timeout(),
            _ => log::trace!("[demux] stale {handle} for {id}"),
        }
        self.reap();
    }

    // -----------------------------------------------------------------------
    // Application access
    // -----------------------------------------------------------------------

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id).filter(|c| c.is_open())
    }

    pub fn connection_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id).filter(|c| c.is_open())
    }

    /// Send on an open connection.  Returns `false` if there is none.
    pub fn send(&mut self, id: &ConnectionId, data: &[u8]) -> bool {
        match self.connection_mut(id) {
            Some(conn) => {
                conn.send(data);
                true
            }
            None => false,
        }
    }

    /// Close a connection and forget it.  Returns `false` if there is none.
    pub fn close(&mut self, id: &ConnectionId) -> bool {
        let found = match self.connection_mut(id) {
            Some(conn) => {
                conn.close();
                true
            }
            None => false,
        };
        self.reap();
        found
    }

    /// Ids of all open connections.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| c.is_open())
            .map(Connection::id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.values().filter(|c| c.is_open()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn route(&mut self, raw: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> Result<Disposition, Discard> {
        let header = read_header(raw)?;
        if header.dst_port != self.config.port {
            return Err(Discard::PortMismatch {
                listening: self.config.port,
                got: header.dst_port,
            });
        }
        if self.config.verify_checksum && calc_checksum(raw, src, dst) != 0 {
            return Err(Discard::ChecksumMismatch);
        }

        let payload = segment::payload(raw, &header);
        let id = ConnectionId {
            peer_addr: src,
            peer_port: header.src_port,
            local_addr: dst,
            local_port: header.dst_port,
        };

        if header.has(flags::SYN) {
            self.accept(id, header.seq);
            return Ok(Disposition::Accepted(id));
        }

        match self.connections.get_mut(&id) {
            Some(conn) if conn.is_open() => {
                conn.on_segment(header.seq, header.ack, header.flags, payload)?;
                Ok(Disposition::Delivered(id))
            }
            _ => Err(Discard::UnknownConnection(id)),
        }
    }

    fn accept(&mut self, id: ConnectionId, peer_seq: u32) {
        let isn = u32::from(rand::rng().random::<u16>());
        let conn = Connection::new(
            id,
            peer_seq,
            isn,
            &self.config,
            self.network.clone(),
            self.timers.clone(),
        );
        conn.transmit(flags::SYN | flags::ACK);
        log::info!("[demux] accepted {id}; → SYN+ACK seq={isn} ack={}", conn.ack_no());

        if self.connections.insert(id, conn).is_some() {
            log::debug!("[demux] {id} re-opened by a new SYN");
        }
        if let (Some(callback), Some(conn)) = (self.on_accept.as_mut(), self.connections.get_mut(&id)) {
            callback(conn);
        }
    }

    /// Forget connections that were closed.
    fn reap(&mut self) {
        self.connections.retain(|id, conn| {
            if !conn.is_open() {
                log::debug!("[demux] {id} removed");
            }
            conn.is_open()
        });
    }
}
