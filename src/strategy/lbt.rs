//! # Listen-Before-Talk Strategy
//!
//! For each attempt the least-failed channel is probed for jamming while the
//! LoRaWAN MAC is paused. A clear channel is then configured for exclusive
//! use and the payload is sent on it, with randomised gaps between retries.
//! Any failure on a channel counts against it and the next best channel is
//! tried.

use super::{Classification, Rgb, TransmissionCore, TransmissionStrategy};
use crate::channel::{ChannelSelector, ChannelState};
use crate::config::LbtConfig;
use crate::constants::{DEFAULT_POWER_INDEX, MIN_SF};
use crate::error::{LinkError, LoRaError};
use crate::link::RawRadio;
use crate::modem::FrameCounters;
use crate::util::hex::describe_payload;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;
use std::time::Duration;

/// Jamming probe history of one LBT strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JammingStats {
    pub total_probes: u32,
    pub jammed_probes: u32,
    pub last_jamming_at: Option<DateTime<Utc>>,
    /// Channel of the most recent attempt.
    pub current_channel: Option<u8>,
    /// Channels given up on while sending the current message.
    pub retry_count: u32,
}

impl JammingStats {
    pub fn record_probe(&mut self, jammed: bool, at: DateTime<Utc>) {
        self.total_probes += 1;
        if jammed {
            self.jammed_probes += 1;
            self.last_jamming_at = Some(at);
        }
    }

    /// Jammed probes over all probes in percent.
    pub fn jamming_rate(&self) -> f64 {
        if self.total_probes == 0 {
            0.0
        } else {
            self.jammed_probes as f64 / self.total_probes as f64 * 100.0
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn log_summary(&self) {
        info!("--- Jamming statistics ---");
        info!("Probes: {}", self.total_probes);
        info!("Jamming detected: {}", self.jammed_probes);
        info!("Jamming rate: {:.1}%", self.jamming_rate());
        match self.last_jamming_at {
            Some(at) => info!(
                "Last jamming event: {} s ago",
                (Utc::now() - at).num_seconds()
            ),
            None => info!("Last jamming event: never"),
        }
    }
}

/// What happened on one channel.
enum ChannelOutcome {
    Delivered,
    /// The payload itself was refused; no channel will take it.
    PayloadRejected,
    Failed(String),
}

pub struct LbtStrategy<R: RawRadio> {
    core: TransmissionCore,
    radio: R,
    selector: ChannelSelector,
    config: LbtConfig,
    jamming: JammingStats,
}

impl<R: RawRadio> LbtStrategy<R> {
    pub fn new(core: TransmissionCore, radio: R, config: LbtConfig) -> Self {
        let selector =
            ChannelSelector::eu868().with_aging(Duration::from_millis(config.failure_aging_ms));
        LbtStrategy {
            core,
            radio,
            selector,
            config,
            jamming: JammingStats::default(),
        }
    }

    pub fn selector(&self) -> &ChannelSelector {
        &self.selector
    }

    pub fn jamming_stats(&self) -> &JammingStats {
        &self.jamming
    }

    pub fn reset_jamming_stats(&mut self) {
        self.jamming.reset();
    }

    pub fn log_jamming_summary(&self) {
        self.jamming.log_summary();
    }

    /// Pause the MAC and probe the channel. A channel that cannot be probed
    /// because the MAC refused to pause is assumed clear.
    async fn probe_channel(&mut self, channel: &ChannelState) -> Result<bool, LinkError> {
        let pause = match self.radio.pause_mac().await {
            Ok(pause) => pause,
            Err(e) => {
                warn!("MAC pause failed ({}), skipping jamming probe", e);
                return Ok(true);
            }
        };

        if !pause.is_sufficient() && !pause.is_indefinite() {
            warn!(
                "MAC pause window of {} ms too short, skipping jamming probe",
                pause.window_ms
            );
            if let Err(e) = self.radio.resume_mac().await {
                warn!("MAC resume failed: {}", e);
            }
            return Ok(true);
        }

        let verdict = self
            .radio
            .detect_jamming(channel.frequency_hz, &self.config.detector)
            .await;
        if let Err(e) = self.radio.resume_mac().await {
            warn!("MAC resume failed: {}", e);
        }

        let verdict = verdict?;
        self.jamming.record_probe(verdict.jammed, Utc::now());
        Ok(!verdict.jammed)
    }

    /// Restrict the module to `channel` and set the uplink parameters.
    async fn lock_channel(&mut self, channel: &ChannelState) -> Result<(), LinkError> {
        let clock = self.core.clock().clone();

        self.radio
            .configure_channel(channel.id, channel.frequency_hz)
            .await?;
        self.radio.enable_only_channel(channel.id).await?;
        clock
            .sleep(Duration::from_millis(self.config.config_settle_ms))
            .await;

        if !self.core.modem().set_spreading_factor(MIN_SF).await {
            warn!("Spreading factor {} not applied", MIN_SF);
        }
        if !self.core.modem().set_power_index(DEFAULT_POWER_INDEX).await {
            warn!("Power index {} not applied", DEFAULT_POWER_INDEX);
        }

        if let Err(e) = self.radio.save_configuration().await {
            warn!("Channel configuration not saved: {}", e);
        }
        clock
            .sleep(Duration::from_millis(self.config.save_settle_ms))
            .await;

        let report = self.radio.verify_channel(channel.id).await;
        if !report.is_enabled() {
            warn!("Channel {} does not read back as enabled", channel.id);
        }
        Ok(())
    }

    async fn try_channel(
        &mut self,
        channel: &ChannelState,
        port: u8,
        payload: &[u8],
    ) -> Result<ChannelOutcome, LoRaError> {
        match self.probe_channel(channel).await {
            Ok(true) => debug!("Channel {} clear", channel.id),
            Ok(false) => {
                self.core.signal(Rgb::NO_FREE_CHANNEL);
                return Ok(ChannelOutcome::Failed("jamming detected".into()));
            }
            Err(e) => return Ok(ChannelOutcome::Failed(format!("jamming probe failed: {e}"))),
        }

        if let Err(e) = self.lock_channel(channel).await {
            return Ok(ChannelOutcome::Failed(format!("configuration failed: {e}")));
        }

        let retries = self.config.retries_per_channel.max(1);
        for attempt in 1..=retries {
            self.core.signal_sending();
            let code = self.core.modem().send(port, payload).await;
            match self.core.handle(code, MIN_SF).await? {
                Classification::Success => return Ok(ChannelOutcome::Delivered),
                Classification::Rejected => return Ok(ChannelOutcome::PayloadRejected),
                Classification::Fatal => return Err(LoRaError::LinkHalted(code)),
                Classification::RetryableSoft | Classification::RetryableNoAck => {
                    if attempt < retries {
                        let (lo, hi) = (
                            self.config.retry_delay_min_ms.min(self.config.retry_delay_max_ms),
                            self.config.retry_delay_min_ms.max(self.config.retry_delay_max_ms),
                        );
                        let delay_ms = rand::thread_rng().gen_range(lo..=hi);
                        info!(
                            "Attempt {}/{} on channel {} failed, retrying in {} ms",
                            attempt, retries, channel.id, delay_ms
                        );
                        self.core
                            .clock()
                            .sleep(Duration::from_millis(delay_ms))
                            .await;
                    }
                }
            }
        }

        Ok(ChannelOutcome::Failed(format!("{retries} attempts failed")))
    }
}

#[async_trait]
impl<R: RawRadio> TransmissionStrategy for LbtStrategy<R> {
    fn name(&self) -> &str {
        "Listen-Before-Talk"
    }

    async fn send_message(&mut self, port: u8, payload: &[u8]) -> Result<bool, LoRaError> {
        info!(
            "Sending message with LBT strategy: {} #{}",
            describe_payload(payload),
            self.core.message_counter()
        );
        self.jamming.retry_count = 0;

        let clock = self.core.clock().clone();
        let max_attempts = self.config.max_channel_attempts;

        for attempt in 1..=max_attempts {
            let Some(channel) = self.selector.select_best_channel(clock.now()).cloned() else {
                warn!("No channels configured");
                return Ok(false);
            };
            self.jamming.current_channel = Some(channel.id);
            info!(
                "Channel attempt {}/{}: channel {} ({} Hz)",
                attempt, max_attempts, channel.id, channel.frequency_hz
            );

            match self.try_channel(&channel, port, payload).await? {
                ChannelOutcome::Delivered => return Ok(true),
                ChannelOutcome::PayloadRejected => {
                    warn!("Payload rejected, not trying other channels");
                    return Ok(false);
                }
                ChannelOutcome::Failed(reason) => {
                    info!("Channel {} failed: {}", channel.id, reason);
                    self.selector.record_failure(channel.id, clock.now());
                    self.jamming.retry_count += 1;
                    if attempt < max_attempts {
                        clock
                            .sleep(Duration::from_millis(self.config.channel_switch_delay_ms))
                            .await;
                    }
                }
            }
        }

        warn!(
            "Unsuccessful transmission after {} channel attempts",
            max_attempts
        );
        Ok(false)
    }

    async fn fetch_frame_counters(&self) -> FrameCounters {
        self.core.fetch_frame_counters().await
    }

    fn core(&self) -> &TransmissionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TransmissionCore {
        &mut self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jamming_stats_rate_and_reset() {
        let mut stats = JammingStats::default();
        stats.record_probe(false, Utc::now());
        stats.record_probe(true, Utc::now());
        stats.current_channel = Some(4);
        stats.retry_count = 2;

        assert_eq!(stats.total_probes, 2);
        assert_eq!(stats.jammed_probes, 1);
        assert!(stats.last_jamming_at.is_some());
        assert!((stats.jamming_rate() - 50.0).abs() < f64::EPSILON);

        stats.reset();
        assert_eq!(stats, JammingStats::default());
        stats.reset();
        assert_eq!(stats, JammingStats::default());
    }
}
