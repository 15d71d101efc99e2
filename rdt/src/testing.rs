//! Test doubles for the network and timer collaborators.

use std::cell::{Cell, RefCell};
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::connection::ConnectionId;
use crate::network::Network;
use crate::timer::{TimerHandle, Timers};

/// Records every outbound segment instead of sending it.
#[derive(Default)]
pub struct RecordingNetwork {
    sent: RefCell<Vec<(Vec<u8>, Ipv4Addr)>>,
}

impl RecordingNetwork {
    /// Drain everything sent so far.
    pub fn take(&self) -> Vec<(Vec<u8>, Ipv4Addr)> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }
}

impl Network for RecordingNetwork {
    fn send(&self, segment: Vec<u8>, dest: Ipv4Addr) {
        self.sent.borrow_mut().push((segment, dest));
    }
}

/// Timers that never fire on their own; tests fire them explicitly.
#[derive(Default)]
pub struct ManualTimers {
    next: Cell<u64>,
    live: RefCell<Vec<(TimerHandle, Duration, ConnectionId)>>,
    cancelled: RefCell<Vec<TimerHandle>>,
}

impl ManualTimers {
    /// Scheduled and not cancelled, oldest first.
    pub fn live(&self) -> Vec<(TimerHandle, Duration)> {
        self.live.borrow().iter().map(|(h, d, _)| (*h, *d)).collect()
    }

    pub fn cancelled(&self) -> Vec<TimerHandle> {
        self.cancelled.borrow().clone()
    }

    /// Remove the oldest live timer as if it had expired.
    pub fn expire(&self) -> Option<(ConnectionId, TimerHandle)> {
        let mut live = self.live.borrow_mut();
        if live.is_empty() {
            return None;
        }
        let (handle, _, id) = live.remove(0);
        Some((id, handle))
    }
}

impl Timers for ManualTimers {
    fn schedule_after(&self, delay: Duration, id: ConnectionId) -> TimerHandle {
        let handle = TimerHandle(self.next.get());
        self.next.set(handle.0 + 1);
        self.live.borrow_mut().push((handle, delay, id));
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        self.live.borrow_mut().retain(|(h, _, _)| *h != handle);
        self.cancelled.borrow_mut().push(handle);
    }
}
