//! Channel Failure Tracking for Listen-Before-Talk
//!
//! Keeps a failure count per EU868 uplink channel and picks the channel with
//! the fewest recent failures. Failures older than the aging window are
//! forgotten the next time a channel is selected.

use crate::constants::{CHANNEL_FAILURE_AGING_MS, EU868_FREQUENCIES};
use log::{debug, info, warn};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Failure history of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    /// LoRaWAN channel id
    pub id: u8,

    /// Frequency in Hz
    pub frequency_hz: u32,

    /// Recent failures, saturating at 255
    pub failure_count: u8,

    /// Time of the most recent failure
    pub last_failure: Option<Instant>,
}

impl ChannelState {
    pub fn new(id: u8, frequency_hz: u32) -> Self {
        ChannelState {
            id,
            frequency_hz,
            failure_count: 0,
            last_failure: None,
        }
    }

    fn is_stale(&self, now: Instant, aging: Duration) -> bool {
        match self.last_failure {
            Some(at) => now.saturating_duration_since(at) > aging,
            None => false,
        }
    }
}

/// Snapshot row for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSummary {
    pub id: u8,
    pub frequency_hz: u32,
    pub failure_count: u8,
}

/// Picks the least-failed channel of a fixed plan.
///
/// One selector belongs to one LBT strategy; radios do not share history.
#[derive(Debug, Clone)]
pub struct ChannelSelector {
    channels: Vec<ChannelState>,
    aging: Duration,
}

impl ChannelSelector {
    /// The eight EU868 uplink channels with the default 30 minute aging.
    pub fn eu868() -> Self {
        Self::new(&EU868_FREQUENCIES, Duration::from_millis(CHANNEL_FAILURE_AGING_MS))
    }

    /// Channels get ids in the order of `frequencies`.
    pub fn new(frequencies: &[u32], aging: Duration) -> Self {
        let channels = frequencies
            .iter()
            .enumerate()
            .map(|(id, &freq)| ChannelState::new(id as u8, freq))
            .collect();

        ChannelSelector { channels, aging }
    }

    pub fn with_aging(mut self, aging: Duration) -> Self {
        self.aging = aging;
        self
    }

    pub fn channels(&self) -> &[ChannelState] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel(&self, id: u8) -> Option<&ChannelState> {
        self.channels.get(id as usize)
    }

    pub fn failure_count(&self, id: u8) -> Option<u8> {
        self.channel(id).map(|c| c.failure_count)
    }

    /// Age out old failures, then return the channel with the fewest
    /// failures. Ties go to the lowest id.
    ///
    /// Returns `None` only for an empty plan.
    pub fn select_best_channel(&mut self, now: Instant) -> Option<&ChannelState> {
        let aging = self.aging;
        for channel in self.channels.iter_mut() {
            if channel.failure_count > 0 && channel.is_stale(now, aging) {
                info!(
                    "Channel {} failures aged out ({} cleared)",
                    channel.id, channel.failure_count
                );
                channel.failure_count = 0;
                channel.last_failure = None;
            }
        }

        let best = self
            .channels
            .iter()
            .min_by_key(|c| (c.failure_count, c.id))?;
        debug!(
            "Selected channel {} ({} Hz, {} failures)",
            best.id, best.frequency_hz, best.failure_count
        );
        Some(best)
    }

    /// Count a failure against `id`. Unknown ids are ignored.
    pub fn record_failure(&mut self, id: u8, now: Instant) {
        match self.channels.get_mut(id as usize) {
            Some(channel) => {
                channel.failure_count = channel.failure_count.saturating_add(1);
                channel.last_failure = Some(now);
                info!(
                    "Channel {} failure recorded (total {})",
                    id, channel.failure_count
                );
            }
            None => warn!("Ignoring failure for unknown channel {}", id),
        }
    }

    /// Channel ids ordered by (failure_count, id).
    pub fn ranked(&self) -> Vec<u8> {
        let mut order: Vec<&ChannelState> = self.channels.iter().collect();
        order.sort_by_key(|c| (c.failure_count, c.id));
        order.into_iter().map(|c| c.id).collect()
    }

    pub fn summary(&self) -> Vec<ChannelSummary> {
        self.channels
            .iter()
            .map(|c| ChannelSummary {
                id: c.id,
                frequency_hz: c.frequency_hz,
                failure_count: c.failure_count,
            })
            .collect()
    }

    /// Forget all failure history.
    pub fn reset(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.failure_count = 0;
            channel.last_failure = None;
        }
    }
}

impl Default for ChannelSelector {
    fn default() -> Self {
        Self::eu868()
    }
}
