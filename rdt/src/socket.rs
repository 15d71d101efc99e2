//! UDP-encapsulated network substrate.
//!
//! [`UdpNetwork`] carries exactly one raw RDT segment per UDP datagram over a
//! `tokio::net::UdpSocket`.  It plays the role of the IP layer:
//! - inbound datagrams become [`Event::Segment`]s whose source address is the
//!   sender's IPv4 address and whose destination is this host's address,
//! - outbound segments are routed by `(destination address, RDT port)`,
//!   learned from the traffic received so far.
//!
//! A segment for a peer that has never sent anything cannot be routed and is
//! dropped, which suits a listening endpoint: every peer speaks first.
//! Sending a FIN ends the local connection, so it also forgets the route; a
//! peer that comes back is re-learned from its next datagram.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::host::Event;
use crate::network::Network;
use crate::segment::{flags, read_header};

/// Largest datagram accepted from the socket.
const MAX_DATAGRAM: usize = 65_535;

type Routes = Arc<Mutex<HashMap<(Ipv4Addr, u16), SocketAddr>>>;

/// A [`Network`] over UDP.
#[derive(Debug)]
pub struct UdpNetwork {
    /// Address this host claims as the segments' destination.
    pub local_addr: Ipv4Addr,
    socket: Arc<UdpSocket>,
    routes: Routes,
}

impl UdpNetwork {
    /// Bind a socket on `bind`.
    ///
    /// `address` is the IPv4 address peers use in their checksum
    /// pseudo-header; it defaults to the bind address, so binding the
    /// unspecified address needs an explicit one for checksums to verify.
    pub async fn bind(bind: SocketAddr, address: Option<Ipv4Addr>) -> Result<Self, Error> {
        let local_addr = match (address, bind) {
            (Some(addr), _) => addr,
            (None, SocketAddr::V4(v4)) => *v4.ip(),
            (None, other) => return Err(Error::NonIpv4(other)),
        };
        let socket = UdpSocket::bind(bind).await?;
        Ok(Self {
            local_addr,
            socket: Arc::new(socket),
            routes: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Address the OS actually bound (resolves port `0`).
    pub fn socket_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawn the receive loop feeding `events` until the host goes away.
    pub fn spawn_receiver(&self, events: mpsc::UnboundedSender<Event>) -> JoinHandle<()> {
        let socket = self.socket.clone();
        let routes = self.routes.clone();
        let local_addr = self.local_addr;

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let (n, from) = match socket.recv_from(&mut buf).await {
                    Ok(v) => v,
                    Err(e) => {
                        log::warn!("[udp] receive failed: {e}");
                        continue;
                    }
                };
                let SocketAddr::V4(from_v4) = from else {
                    log::warn!("[udp] ignoring datagram from non-IPv4 {from}");
                    continue;
                };
                let raw = buf[..n].to_vec();
                let src = *from_v4.ip();

                // Malformed segments still go up so the demultiplexer logs them.
                if let Ok(header) = read_header(&raw) {
                    if let Ok(mut routes) = routes.lock() {
                        routes.insert((src, header.src_port), from);
                    }
                }
                let event = Event::Segment {
                    src,
                    dst: local_addr,
                    raw,
                };
                if events.send(event).is_err() {
                    log::debug!("[udp] host gone; receiver exiting");
                    break;
                }
            }
        })
    }

    fn route(&self, dest: Ipv4Addr, port: u16) -> Option<SocketAddr> {
        self.routes.lock().ok()?.get(&(dest, port)).copied()
    }

    fn forget(&self, dest: Ipv4Addr, port: u16) {
        if let Ok(mut routes) = self.routes.lock() {
            if routes.remove(&(dest, port)).is_some() {
                log::debug!("[udp] forgot route to {dest}:{port}");
            }
        }
    }
}

impl Network for UdpNetwork {
    fn send(&self, segment: Vec<u8>, dest: Ipv4Addr) {
        let header = match read_header(&segment) {
            Ok(header) => header,
            Err(e) => {
                log::warn!("[udp] refusing to send malformed segment: {e}");
                return;
            }
        };
        let port = header.dst_port;
        let Some(to) = self.route(dest, port) else {
            log::warn!("[udp] no route to {dest}:{port}; segment dropped");
            return;
        };
        // Best effort: a full socket buffer is just another lost datagram.
        if let Err(e) = self.socket.try_send_to(&segment, to) {
            log::warn!("[udp] send to {to} failed: {e}");
        }
        if header.has(flags::FIN) {
            self.forget(dest, port);
        }
    }
}
