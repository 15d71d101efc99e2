//! Single-threaded event loop driving one [`Demultiplexer`].
//!
//! Network receivers and retransmission timers never touch protocol state
//! directly.  They post [`Event`]s into an unbounded channel and
//! [`Host::run`] applies them one at a time, so no two handlers ever overlap
//! and events for a connection are processed in arrival order.
//!
//! ```text
//!  UdpNetwork / Simulator ──Segment──┐
//!                                    ├──▶ mpsc ──▶ Host ──▶ Demultiplexer
//!  TokioTimers ────────────Timeout───┘
//! ```
//!
//! The host holds `Rc`s and is therefore `!Send`: run it on the task that
//! created it (e.g. a `current_thread` runtime's main future).

use std::net::Ipv4Addr;
use std::rc::Rc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::connection::ConnectionId;
use crate::demux::{Demultiplexer, Disposition};
use crate::network::Network;
use crate::timer::{TimerHandle, TokioTimers};

/// Something the host must react to.
#[derive(Debug)]
pub enum Event {
    /// A raw segment arrived from the network.
    Segment {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        raw: Vec<u8>,
    },
    /// A retransmission timer expired.
    Timeout { id: ConnectionId, handle: TimerHandle },
}

pub struct Host {
    demux: Demultiplexer,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Host {
    /// Build a host listening per `config` and transmitting on `network`.
    ///
    /// Must be called inside a tokio runtime: timers are spawned tasks.
    pub fn new(config: Config, network: Rc<dyn Network>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let timers = Rc::new(TokioTimers::new(tx.clone()));
        Self {
            demux: Demultiplexer::new(config, network, timers),
            tx,
            rx,
        }
    }

    /// Sender for posting inbound segments into this host.
    pub fn events(&self) -> mpsc::UnboundedSender<Event> {
        self.tx.clone()
    }

    pub fn demux(&self) -> &Demultiplexer {
        &self.demux
    }

    pub fn demux_mut(&mut self) -> &mut Demultiplexer {
        &mut self.demux
    }

    /// Apply one event.  Segment events report what became of the segment.
    pub fn dispatch(&mut self, event: Event) -> Option<Disposition> {
        match event {
            Event::Segment { src, dst, raw } => Some(self.demux.on_segment(&raw, src, dst)),
            Event::Timeout { id, handle } => {
                self.demux.on_timer(id, handle);
                None
            }
        }
    }

    /// Wait for the next event and apply it.
    pub async fn step(&mut self) -> Option<Disposition> {
        // The host keeps a sender of its own, so the channel never closes.
        let event = self.rx.recv().await?;
        self.dispatch(event)
    }

    /// Process events forever.
    pub async fn run(&mut self) {
        while let Some(event) = self.rx.recv().await {
            self.dispatch(event);
        }
    }
}
