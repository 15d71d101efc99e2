//! Segment-counting congestion window.
//!
//! Additive increase by one segment per acknowledgement, floor-halving on a
//! retransmission timeout.  There is no slow-start threshold and the window
//! never gates transmission; it is bookkeeping for the sender.

/// Congestion window and its occupancy, both counted in segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    cwnd: u32,
    occupancy: u32,
}

impl Window {
    pub fn new(initial: u32) -> Self {
        Self {
            cwnd: initial,
            occupancy: 0,
        }
    }

    /// A segment entered the network.
    pub fn on_send(&mut self) {
        self.occupancy += 1;
    }

    /// The oldest outstanding segment was acknowledged.
    pub fn on_ack(&mut self) {
        self.cwnd = self.cwnd.saturating_add(1);
        self.occupancy = self.occupancy.saturating_sub(1);
    }

    /// A retransmission timeout fired: `cwnd -= cwnd / 2`.
    pub fn on_timeout(&mut self) {
        self.cwnd -= self.cwnd / 2;
    }

    pub fn get(&self) -> u32 {
        self.cwnd
    }

    pub fn occupancy(&self) -> u32 {
        self.occupancy
    }
}
