//! # Transmission Statistics
//!
//! Lifetime counters of one strategy: attempts, confirmed successes, missing
//! acknowledgements, and a histogram of attempts per spreading factor.

use crate::constants::{MAX_SF, MIN_SF, SF_BUCKETS};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmissionStats {
    /// Every classified attempt, whatever its outcome.
    pub attempts: u64,
    pub successes: u64,
    /// Attempts that ended without acknowledgement.
    pub failures: u64,
    /// Attempts per spreading factor, SF9 first.
    pub sf_histogram: [u64; SF_BUCKETS],
}

impl TransmissionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one attempt made at `sf`; factors outside 9..=12 only count
    /// towards the total.
    pub fn record_attempt(&mut self, sf: u8) {
        self.attempts += 1;
        if (MIN_SF..=MAX_SF).contains(&sf) {
            self.sf_histogram[(sf - MIN_SF) as usize] += 1;
        }
    }

    pub fn record_success(&mut self) {
        self.successes += 1;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Attempts made at `sf`, `None` outside the tracked range.
    pub fn attempts_at(&self, sf: u8) -> Option<u64> {
        if (MIN_SF..=MAX_SF).contains(&sf) {
            Some(self.sf_histogram[(sf - MIN_SF) as usize])
        } else {
            None
        }
    }

    /// Successes over attempts in percent.
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64 * 100.0
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn log_summary(&self, strategy: &str) {
        info!(
            "[{}] attempts: {}, successes: {}, no-ack: {} ({:.1}% success)",
            strategy,
            self.attempts,
            self.successes,
            self.failures,
            self.success_rate()
        );
        let histogram: Vec<String> = (MIN_SF..=MAX_SF)
            .zip(self.sf_histogram.iter())
            .map(|(sf, count)| format!("SF{sf}({count})"))
            .collect();
        info!("[{}] spreading factors: {}", strategy, histogram.join(", "));
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
