//! The datagram substrate RDT runs on.
//!
//! The network layer does addressing and best-effort delivery: segments may be
//! dropped, duplicated, reordered or corrupted.  Outbound segments are handed
//! over through [`Network::send`], which must not block.  Inbound segments
//! reach the protocol as [`Event::Segment`](crate::host::Event::Segment)
//! values pushed into the host's event channel.
//!
//! Implementations:
//! - [`UdpNetwork`](crate::socket::UdpNetwork): one segment per UDP datagram.
//! - [`Simulator`](crate::simulator::Simulator): in-memory, fault-injecting.

use std::net::Ipv4Addr;

/// Outbound half of the network layer.
pub trait Network {
    /// Hand `segment` to the network for delivery to `dest`.
    fn send(&self, segment: Vec<u8>, dest: Ipv4Addr);
}
