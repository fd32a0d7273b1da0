//! Transport-wide congestion control feedback, generalized from the
//! delay-based estimator previously split across bandwidth estimation
//! and congestion control modules into the single signal WebRTC
//! actually standardizes on: per-packet arrival time deltas (RFC draft
//! transport-cc), used to drive a simple additive-increase /
//! multiplicative-decrease bitrate estimate.

use std::collections::BTreeMap;
use std::time::Instant;

const INCREASE_FACTOR: f64 = 1.05;
const DECREASE_FACTOR: f64 = 0.85;
const MIN_BITRATE_BPS: u64 = 50_000;
const MAX_BITRATE_BPS: u64 = 50_000_000;
const OVERUSE_THRESHOLD_MS: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Normal,
    Overusing,
    Underusing,
}

/// Tracks per-packet send/arrival deltas and produces a bitrate
/// estimate and target REMB-style feedback value.
pub struct TwccEstimator {
    current_bitrate_bps: u64,
    arrivals: BTreeMap<u16, Instant>,
    last_group_delay_ms: Option<f64>,
}

impl TwccEstimator {
    pub fn new(starting_bitrate_bps: u64) -> Self {
        TwccEstimator {
            current_bitrate_bps: starting_bitrate_bps.clamp(MIN_BITRATE_BPS, MAX_BITRATE_BPS),
            arrivals: BTreeMap::new(),
            last_group_delay_ms: None,
        }
    }

    pub fn bitrate_bps(&self) -> u64 {
        self.current_bitrate_bps
    }

    /// Record an RTP sequence number's arrival time. Sequences are
    /// retained only long enough to compute the inter-group delay.
    pub fn record_arrival(&mut self, sequence_number: u16, arrival: Instant) {
        self.arrivals.insert(sequence_number, arrival);
        if self.arrivals.len() > 64 {
            let oldest_key = *self.arrivals.keys().next().unwrap();
            self.arrivals.remove(&oldest_key);
        }
    }

    /// Feed the observed one-way delay variation (ms) between two
    /// packet groups and update the bitrate estimate accordingly.
    pub fn on_delay_sample(&mut self, group_delay_ms: f64) -> NetworkState {
        let state = match self.last_group_delay_ms {
            Some(prev) if group_delay_ms - prev > OVERUSE_THRESHOLD_MS => NetworkState::Overusing,
            Some(prev) if group_delay_ms - prev < -OVERUSE_THRESHOLD_MS => NetworkState::Underusing,
            _ => NetworkState::Normal,
        };
        self.last_group_delay_ms = Some(group_delay_ms);

        self.current_bitrate_bps = match state {
            NetworkState::Overusing => {
                ((self.current_bitrate_bps as f64) * DECREASE_FACTOR) as u64
            }
            NetworkState::Normal | NetworkState::Underusing => {
                ((self.current_bitrate_bps as f64) * INCREASE_FACTOR) as u64
            }
        }
        .clamp(MIN_BITRATE_BPS, MAX_BITRATE_BPS);

        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overuse_reduces_bitrate() {
        let mut e = TwccEstimator::new(1_000_000);
        e.on_delay_sample(0.0);
        let state = e.on_delay_sample(50.0);
        assert_eq!(state, NetworkState::Overusing);
        assert!(e.bitrate_bps() < 1_000_000);
    }

    #[test]
    fn stable_delay_increases_bitrate() {
        let mut e = TwccEstimator::new(1_000_000);
        e.on_delay_sample(10.0);
        let state = e.on_delay_sample(10.5);
        assert_eq!(state, NetworkState::Normal);
        assert!(e.bitrate_bps() > 1_000_000);
    }

    #[test]
    fn bitrate_is_clamped_to_bounds() {
        let mut e = TwccEstimator::new(MIN_BITRATE_BPS);
        for _ in 0..20 {
            e.on_delay_sample(100.0);
        }
        assert!(e.bitrate_bps() >= MIN_BITRATE_BPS);
    }
}
