//! # Jamming Detection
//!
//! Two probes decide whether a channel is being jammed. Both put the radio in
//! raw LoRa mode on the channel frequency first; the MAC must already be
//! paused.
//!
//! - [`JammingDetector::TriggerAndListen`] transmits short bursts and listens
//!   for a reactive jammer answering them.
//! - [`JammingDetector::CompositeScoring`] combines passive listening, transmit
//!   timing and repeated-transmission failure into a weighted score.

use super::client::{LineProtocolClient, ReceiveEvent, SerialLink};
use crate::constants::*;
use crate::error::{LinkError, LoRaError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reactive-jammer probe settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerListenConfig {
    pub trials: u8,
    /// Wait between the trigger and opening the receive window.
    pub react_delay_ms: u64,
    pub listen_ms: u64,
    pub poll_interval_ms: u64,
    /// Wait before reopening a window that closed.
    pub reopen_delay_ms: u64,
    pub inter_trial_ms: u64,
    /// Trials with activity needed to call the channel jammed.
    pub threshold: u8,
}

impl Default for TriggerListenConfig {
    fn default() -> Self {
        TriggerListenConfig {
            trials: 5,
            react_delay_ms: 200,
            listen_ms: 2000,
            poll_interval_ms: 100,
            reopen_delay_ms: 50,
            inter_trial_ms: 1000,
            threshold: 2,
        }
    }
}

/// Weighted multi-signal probe settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    pub passive_listen_ms: u64,
    pub window_ms: u64,
    pub poll_interval_ms: u64,
    /// A window with more events than this raises the passive flag.
    pub activity_threshold: u32,
    pub passive_weight: u8,
    pub timing_trials: u8,
    pub timing_spread_ms: u64,
    pub timing_min_complete: u8,
    pub timing_weight: u8,
    pub repeat_trials: u8,
    pub repeat_failure_threshold: u8,
    pub repeat_weight: u8,
    pub jammed_score: u8,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        CompositeConfig {
            passive_listen_ms: 3000,
            window_ms: 500,
            poll_interval_ms: 100,
            activity_threshold: 5,
            passive_weight: 2,
            timing_trials: 5,
            timing_spread_ms: 2000,
            timing_min_complete: 4,
            timing_weight: 1,
            repeat_trials: 3,
            repeat_failure_threshold: 2,
            repeat_weight: 1,
            jammed_score: 2,
        }
    }
}

impl CompositeConfig {
    pub fn max_score(&self) -> u16 {
        u16::from(self.passive_weight)
            + u16::from(self.timing_weight)
            + u16::from(self.repeat_weight)
    }
}

/// Detector selection together with its thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JammingDetector {
    TriggerAndListen(TriggerListenConfig),
    CompositeScoring(CompositeConfig),
}

impl Default for JammingDetector {
    fn default() -> Self {
        JammingDetector::TriggerAndListen(TriggerListenConfig::default())
    }
}

impl JammingDetector {
    pub fn trigger_and_listen() -> Self {
        Self::default()
    }

    pub fn composite() -> Self {
        JammingDetector::CompositeScoring(CompositeConfig::default())
    }

    pub fn name(&self) -> &'static str {
        match self {
            JammingDetector::TriggerAndListen(_) => "trigger-and-listen",
            JammingDetector::CompositeScoring(_) => "composite-scoring",
        }
    }

    pub fn validate(&self) -> Result<(), LoRaError> {
        match self {
            JammingDetector::TriggerAndListen(cfg) => {
                if cfg.trials == 0 || cfg.listen_ms == 0 || cfg.poll_interval_ms == 0 {
                    return Err(LoRaError::Config(
                        "trigger-and-listen needs trials, listen_ms and poll_interval_ms > 0"
                            .into(),
                    ));
                }
                if cfg.threshold == 0 || cfg.threshold > cfg.trials {
                    return Err(LoRaError::Config(format!(
                        "trigger-and-listen threshold must be within 1..={}",
                        cfg.trials
                    )));
                }
            }
            JammingDetector::CompositeScoring(cfg) => {
                if cfg.passive_listen_ms == 0 || cfg.window_ms == 0 || cfg.poll_interval_ms == 0
                {
                    return Err(LoRaError::Config(
                        "composite scoring needs non-empty listen windows".into(),
                    ));
                }
                if cfg.timing_trials == 0 || cfg.repeat_trials == 0 {
                    return Err(LoRaError::Config(
                        "composite scoring needs timing and repeat trials".into(),
                    ));
                }
                if cfg.jammed_score == 0 || u16::from(cfg.jammed_score) > cfg.max_score() {
                    return Err(LoRaError::Config(format!(
                        "composite jammed_score must be within 1..={}",
                        cfg.max_score()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Per-signal breakdown of a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    Reactive {
        trials: u8,
        reactive_trials: u8,
    },
    Composite {
        peak_window_events: u32,
        passive_flag: bool,
        completed_transmissions: u8,
        timing_spread_ms: u64,
        timing_flag: bool,
        repeat_failures: u8,
        repeat_flag: bool,
        score: u16,
    },
}

/// Outcome of one jamming probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JammingVerdict {
    pub jammed: bool,
    pub evidence: Evidence,
}

impl<P: SerialLink> LineProtocolClient<P> {
    /// Probe `frequency_hz` with the selected detector.
    ///
    /// Failing to configure the radio is an error; a clear verdict is only
    /// returned for a probe that actually ran.
    pub async fn detect_jamming(
        &mut self,
        frequency_hz: u32,
        detector: &JammingDetector,
    ) -> Result<JammingVerdict, LinkError> {
        self.set_frequency(frequency_hz).await?;
        self.set_lora_mode(MIN_SF, PROBE_BANDWIDTH_KHZ, CODING_RATES[0], PROBE_SYNC_WORD)
            .await?;

        let verdict = match detector {
            JammingDetector::TriggerAndListen(cfg) => self.trigger_and_listen(cfg).await?,
            JammingDetector::CompositeScoring(cfg) => self.composite_scoring(cfg).await?,
        };

        if verdict.jammed {
            warn!(
                "Jamming detected on {} Hz ({}): {:?}",
                frequency_hz,
                detector.name(),
                verdict.evidence
            );
        } else {
            info!("{} Hz clear ({})", frequency_hz, detector.name());
        }
        Ok(verdict)
    }

    async fn trigger_and_listen(
        &mut self,
        cfg: &TriggerListenConfig,
    ) -> Result<JammingVerdict, LinkError> {
        let clock = self.clock();
        let mut reactive_trials = 0u8;

        for trial in 0..cfg.trials {
            let stamp = self.uptime_ms() & 0xFFFF;
            let trigger = format!("010203{trial:02X}{stamp:04X}");
            if let Err(e) = self.transmit(&trigger).await {
                // Only trials whose trigger went out can count as reactive.
                debug!("Trigger {} not sent, trial skipped: {}", trial + 1, e);
                continue;
            }

            clock.sleep(Duration::from_millis(cfg.react_delay_ms)).await;

            let activity = match self.start_receive(0).await {
                Ok(()) => self.listen_for_reaction(cfg).await?,
                Err(e) => {
                    warn!("Receive window not opened on trial {}: {}", trial + 1, e);
                    false
                }
            };
            if let Err(e) = self.stop_receive().await {
                debug!("radio sleep: {}", e);
            }

            if activity {
                reactive_trials += 1;
            }
            debug!(
                "Trial {}/{}: {}",
                trial + 1,
                cfg.trials,
                if activity { "activity" } else { "quiet" }
            );

            if trial + 1 < cfg.trials {
                clock.sleep(Duration::from_millis(cfg.inter_trial_ms)).await;
            }
        }

        Ok(JammingVerdict {
            jammed: reactive_trials >= cfg.threshold,
            evidence: Evidence::Reactive {
                trials: cfg.trials,
                reactive_trials,
            },
        })
    }

    /// Poll an open window until a packet shows up or the listen time ends.
    async fn listen_for_reaction(&mut self, cfg: &TriggerListenConfig) -> Result<bool, LinkError> {
        let clock = self.clock();
        let started = clock.now();

        while clock.elapsed_ms(started) < cfg.listen_ms {
            match self.check_receive().await? {
                ReceiveEvent::Packet(data) => {
                    match self.get_snr().await {
                        Ok(snr) => info!("Reaction received ({} chars, SNR {} dB)", data.len(), snr),
                        Err(_) => info!("Reaction received ({} chars)", data.len()),
                    }
                    return Ok(true);
                }
                ReceiveEvent::WindowClosed => {
                    clock.sleep(Duration::from_millis(cfg.reopen_delay_ms)).await;
                    if let Err(e) = self.start_receive(0).await {
                        debug!("Could not reopen receive window: {}", e);
                    }
                }
                ReceiveEvent::Nothing => {}
            }
            clock.sleep(Duration::from_millis(cfg.poll_interval_ms)).await;
        }
        Ok(false)
    }

    async fn composite_scoring(&mut self, cfg: &CompositeConfig) -> Result<JammingVerdict, LinkError> {
        let peak_window_events = self.passive_activity(cfg).await?;
        let passive_flag = peak_window_events > cfg.activity_threshold;

        let (completed_transmissions, timing_spread_ms) = self.transmit_timing(cfg).await;
        let timing_flag = timing_spread_ms > cfg.timing_spread_ms
            || completed_transmissions < cfg.timing_min_complete;

        let repeat_failures = self.repeated_failures(cfg).await;
        let repeat_flag = repeat_failures >= cfg.repeat_failure_threshold;

        let mut score = 0u16;
        if passive_flag {
            score += u16::from(cfg.passive_weight);
        }
        if timing_flag {
            score += u16::from(cfg.timing_weight);
        }
        if repeat_flag {
            score += u16::from(cfg.repeat_weight);
        }

        debug!(
            "Composite score {}/{} (passive peak {}, {} tx complete, spread {} ms, {} repeat failures)",
            score,
            cfg.max_score(),
            peak_window_events,
            completed_transmissions,
            timing_spread_ms,
            repeat_failures
        );

        Ok(JammingVerdict {
            jammed: score >= u16::from(cfg.jammed_score),
            evidence: Evidence::Composite {
                peak_window_events,
                passive_flag,
                completed_transmissions,
                timing_spread_ms,
                timing_flag,
                repeat_failures,
                repeat_flag,
                score,
            },
        })
    }

    /// Highest number of receive events seen in any single window.
    async fn passive_activity(&mut self, cfg: &CompositeConfig) -> Result<u32, LinkError> {
        let clock = self.clock();
        let started = clock.now();
        let mut peak = 0u32;

        while clock.elapsed_ms(started) < cfg.passive_listen_ms {
            if let Err(e) = self.start_receive(0).await {
                warn!("Passive window not opened: {}", e);
                clock.sleep(Duration::from_millis(cfg.window_ms)).await;
                continue;
            }

            let window_start = clock.now();
            let mut events = 0u32;
            while clock.elapsed_ms(window_start) < cfg.window_ms {
                match self.check_receive().await? {
                    ReceiveEvent::Packet(_) => {
                        events += 1;
                        // Back-to-back notifications are polled without a pause.
                        continue;
                    }
                    ReceiveEvent::WindowClosed => {
                        if let Err(e) = self.start_receive(0).await {
                            debug!("Could not reopen passive window: {}", e);
                        }
                    }
                    ReceiveEvent::Nothing => {}
                }
                clock.sleep(Duration::from_millis(cfg.poll_interval_ms)).await;
            }

            if let Err(e) = self.stop_receive().await {
                debug!("radio sleep: {}", e);
            }
            peak = peak.max(events);
        }
        Ok(peak)
    }

    /// Completed transmissions and the spread of their durations.
    async fn transmit_timing(&mut self, cfg: &CompositeConfig) -> (u8, u64) {
        let clock = self.clock();
        let mut durations = Vec::with_capacity(cfg.timing_trials as usize);

        for trial in 0..cfg.timing_trials {
            let started = clock.now();
            match self.transmit(&format!("0405{trial:02X}")).await {
                Ok(()) => durations.push(clock.elapsed_ms(started)),
                Err(e) => debug!("Timing probe {} incomplete: {}", trial + 1, e),
            }
        }

        let spread = match (durations.iter().min(), durations.iter().max()) {
            (Some(min), Some(max)) if durations.len() >= 2 => max - min,
            _ => 0,
        };
        (durations.len() as u8, spread)
    }

    /// Identical transmissions that did not complete with `radio_tx_ok`.
    async fn repeated_failures(&mut self, cfg: &CompositeConfig) -> u8 {
        let mut failures = 0u8;
        for trial in 0..cfg.repeat_trials {
            if let Err(e) = self.transmit("0A0B0C0D").await {
                debug!("Repeat probe {} failed: {}", trial + 1, e);
                failures += 1;
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_detector_is_trigger_and_listen() {
        match JammingDetector::default() {
            JammingDetector::TriggerAndListen(cfg) => {
                assert_eq!(cfg.trials, 5);
                assert_eq!(cfg.threshold, 2);
                assert_eq!(cfg.listen_ms, 2000);
            }
            other => panic!("unexpected default {other:?}"),
        }
    }

    #[test]
    fn test_composite_weights() {
        let cfg = CompositeConfig::default();
        assert_eq!(cfg.max_score(), 4);
        assert_eq!(cfg.jammed_score, 2);
        assert!(JammingDetector::composite().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unreachable_threshold() {
        let detector = JammingDetector::TriggerAndListen(TriggerListenConfig {
            threshold: 6,
            ..Default::default()
        });
        assert!(detector.validate().is_err());

        let detector = JammingDetector::CompositeScoring(CompositeConfig {
            jammed_score: 5,
            ..Default::default()
        });
        assert!(detector.validate().is_err());
    }

    #[test]
    fn test_large_weights_do_not_overflow() {
        let cfg = CompositeConfig {
            passive_weight: 200,
            timing_weight: 100,
            repeat_weight: 255,
            jammed_score: 255,
            ..Default::default()
        };
        assert_eq!(cfg.max_score(), 555);
        assert!(JammingDetector::CompositeScoring(cfg).validate().is_ok());
    }

    #[test]
    fn test_detector_serde_tagging() {
        let detector: JammingDetector =
            serde_json::from_str(r#"{ "kind": "composite_scoring", "jammed_score": 3 }"#).unwrap();
        match detector {
            JammingDetector::CompositeScoring(cfg) => {
                assert_eq!(cfg.jammed_score, 3);
                assert_eq!(cfg.window_ms, 500);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
