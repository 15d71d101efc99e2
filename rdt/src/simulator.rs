//! In-process lossy network for exercising the reliability mechanisms.
//!
//! [`Simulator`] is a [`Network`] that, instead of touching a socket, hands
//! each surviving segment to an mpsc channel.  Before that it applies a
//! seeded fault model:
//!
//! | Fault       | Effect                                           |
//! |-------------|--------------------------------------------------|
//! | Loss        | Drop the segment with probability `loss_rate`.   |
//! | Duplication | Deliver it twice with `duplicate_rate`.          |
//! | Corruption  | Flip one random bit with `corrupt_rate`.         |
//! | Latency     | Hold survivors for `delay`, keeping order.       |
//!
//! The same seed always yields the same fault sequence, so a failing run can
//! be replayed exactly.

use std::cell::{Cell, RefCell};
use std::net::Ipv4Addr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::network::Network;

/// Fault-injection knobs.  Rates outside `[0.0, 1.0]` are clamped.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub loss_rate: f64,
    pub duplicate_rate: f64,
    pub corrupt_rate: f64,
    /// One-way latency applied to every delivered segment.
    pub delay: Duration,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // Transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            corrupt_rate: 0.0,
            delay: Duration::ZERO,
            seed: 0,
        }
    }
}

/// What the simulator did with the traffic so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    pub sent: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub corrupted: u64,
}

type Outbox = mpsc::UnboundedSender<(Vec<u8>, Ipv4Addr)>;

pub struct Simulator {
    config: SimulatorConfig,
    rng: RefCell<StdRng>,
    out: Outbox,
    /// Feeds the latency task; `None` when `delay` is zero.
    link: Option<mpsc::UnboundedSender<(Instant, Vec<u8>, Ipv4Addr)>>,
    stats: Cell<SimulatorStats>,
}

impl Simulator {
    /// Create a simulator delivering survivors to `out`.
    ///
    /// A non-zero `delay` spawns a forwarding task, so it must be called
    /// within a tokio runtime.
    pub fn new(config: SimulatorConfig, out: Outbox) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let link = (!config.delay.is_zero()).then(|| spawn_link(out.clone()));
        Self {
            config,
            rng: RefCell::new(rng),
            out,
            link,
            stats: Cell::new(SimulatorStats::default()),
        }
    }

    pub fn stats(&self) -> SimulatorStats {
        self.stats.get()
    }

    fn roll(&self, rate: f64) -> bool {
        self.rng.borrow_mut().random_bool(rate.clamp(0.0, 1.0))
    }

    fn deliver(&self, segment: Vec<u8>, dest: Ipv4Addr) {
        let sent = match &self.link {
            Some(link) => link
                .send((Instant::now() + self.config.delay, segment, dest))
                .is_ok(),
            None => self.out.send((segment, dest)).is_ok(),
        };
        if !sent {
            log::debug!("[sim] receiver gone; segment for {dest} discarded");
        }
    }
}

/// Constant latency keeps deadlines monotonic, so one FIFO task suffices.
fn spawn_link(out: Outbox) -> mpsc::UnboundedSender<(Instant, Vec<u8>, Ipv4Addr)> {
    let (tx, mut rx) = mpsc::unbounded_channel::<(Instant, Vec<u8>, Ipv4Addr)>();
    tokio::spawn(async move {
        while let Some((at, segment, dest)) = rx.recv().await {
            tokio::time::sleep_until(at).await;
            if out.send((segment, dest)).is_err() {
                break;
            }
        }
    });
    tx
}

impl Network for Simulator {
    fn send(&self, mut segment: Vec<u8>, dest: Ipv4Addr) {
        let mut stats = self.stats.get();
        stats.sent += 1;

        if self.roll(self.config.loss_rate) {
            stats.dropped += 1;
            self.stats.set(stats);
            log::debug!("[sim] dropped {} bytes for {dest}", segment.len());
            return;
        }
        if !segment.is_empty() && self.roll(self.config.corrupt_rate) {
            let bit = self.rng.borrow_mut().random_range(0..segment.len() * 8);
            segment[bit / 8] ^= 1 << (bit % 8);
            stats.corrupted += 1;
            log::debug!("[sim] flipped bit {bit} of segment for {dest}");
        }
        if self.roll(self.config.duplicate_rate) {
            stats.duplicated += 1;
            log::debug!("[sim] duplicated segment for {dest}");
            self.deliver(segment.clone(), dest);
        }
        self.stats.set(stats);
        self.deliver(segment, dest);
    }
}
