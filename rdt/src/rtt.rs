//! Round-trip time estimation and retransmission timeout.
//!
//! Smoothed estimate after Jacobson:
//!
//! ```text
//! first sample:  EstimatedRTT = S,  DevRTT = S / 2
//! afterwards:    EstimatedRTT = (1 - α)·EstimatedRTT + α·S
//!                DevRTT       = (1 - β)·DevRTT + β·|S - EstimatedRTT|
//! timeout      = EstimatedRTT + 4·DevRTT
//! ```
//!
//! with α = 1/8 and β = 1/4.  `DevRTT` is updated against the *new*
//! `EstimatedRTT`.  There is no exponential back-off: the timeout only
//! changes when a sample arrives.

use std::time::Duration;

/// Gain applied to a new sample when smoothing the RTT.
pub const ALPHA: f64 = 0.125;
/// Gain applied to a new deviation when smoothing the RTT variance.
pub const BETA: f64 = 0.25;

/// RTT statistics for one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct RttEstimator {
    estimated: Option<Duration>,
    deviation: Option<Duration>,
    timeout: Duration,
}

impl RttEstimator {
    /// Estimator with no samples; [`timeout`](Self::timeout) is `initial`.
    pub fn new(initial: Duration) -> Self {
        Self {
            estimated: None,
            deviation: None,
            timeout: initial,
        }
    }

    /// Fold one RTT measurement into the estimate and recompute the timeout.
    pub fn sample(&mut self, sample: Duration) {
        let (estimated, deviation) = match (self.estimated, self.deviation) {
            (Some(est), Some(dev)) => {
                let est = est.mul_f64(1.0 - ALPHA) + sample.mul_f64(ALPHA);
                let dev = dev.mul_f64(1.0 - BETA) + sample.abs_diff(est).mul_f64(BETA);
                (est, dev)
            }
            _ => (sample, sample / 2),
        };
        self.estimated = Some(estimated);
        self.deviation = Some(deviation);
        self.timeout = estimated + deviation * 4;
    }

    /// Smoothed RTT, `None` until the first sample.
    pub fn estimated(&self) -> Option<Duration> {
        self.estimated
    }

    /// RTT deviation, `None` until the first sample.
    pub fn deviation(&self) -> Option<Duration> {
        self.deviation
    }

    /// Current retransmission timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
