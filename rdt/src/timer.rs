//! Retransmission timer scheduling.
//!
//! A connection never sleeps itself.  It asks a [`Timers`] implementation to
//! schedule an expiry and gets back a [`TimerHandle`]; when the delay elapses
//! the host delivers `(connection id, handle)` back to the
//! [`Demultiplexer`](crate::demux::Demultiplexer), which forwards it only if
//! the handle is still the one the connection has armed.  That comparison is
//! what makes a cancel that loses the race against an already-fired timer
//! harmless.
//!
//! [`TokioTimers`] is the runtime implementation: every arm spawns a
//! `tokio::time::sleep` task that posts an [`Event::Timeout`] into the host's
//! event channel, and cancel aborts that task.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::connection::ConnectionId;
use crate::host::Event;

/// Opaque identifier of one scheduled expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Schedule-after-delay / cancel primitive.
///
/// Methods take `&self`; implementations are shared between every connection
/// of one demultiplexer on a single thread.
pub trait Timers {
    /// Arrange for `(id, handle)` to be delivered after `delay`.
    fn schedule_after(&self, delay: Duration, id: ConnectionId) -> TimerHandle;

    /// Drop a pending expiry.  No effect if it already fired.
    fn cancel(&self, handle: TimerHandle);
}

/// [`Timers`] backed by spawned tokio sleep tasks.
pub struct TokioTimers {
    events: mpsc::UnboundedSender<Event>,
    next: Cell<u64>,
    pending: RefCell<HashMap<TimerHandle, AbortHandle>>,
}

impl TokioTimers {
    /// Deliver expiries into `events`.
    pub fn new(events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            events,
            next: Cell::new(0),
            pending: RefCell::new(HashMap::new()),
        }
    }

    /// Number of expiries scheduled and not yet cancelled.
    ///
    /// A connection cancels its armed handle when the expiry is handled, so
    /// delivered expiries leave the table too.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl Timers for TokioTimers {
    fn schedule_after(&self, delay: Duration, id: ConnectionId) -> TimerHandle {
        let handle = TimerHandle(self.next.get());
        self.next.set(handle.0 + 1);

        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The host may already be gone; nothing left to notify.
            let _ = events.send(Event::Timeout { id, handle });
        });
        self.pending.borrow_mut().insert(handle, task.abort_handle());
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(task) = self.pending.borrow_mut().remove(&handle) {
            task.abort();
        }
    }
}
