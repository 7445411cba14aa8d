//! Raw radio capability used by Listen-Before-Talk
//!
//! [`RawRadio`] is the slice of the line protocol the LBT strategy needs. It is
//! implemented by [`LineProtocolClient`] directly and by
//! `Arc<tokio::sync::Mutex<T>>`, which serialises several users of one serial
//! link: each call holds the lock for its whole exchange.

use super::client::{ChannelReport, LineProtocolClient, MacPause, SerialLink};
use super::jamming::{Evidence, JammingDetector, JammingVerdict};
use crate::error::LinkError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait RawRadio: Send + Sync {
    async fn pause_mac(&mut self) -> Result<MacPause, LinkError>;

    async fn resume_mac(&mut self) -> Result<(), LinkError>;

    async fn detect_jamming(
        &mut self,
        frequency_hz: u32,
        detector: &JammingDetector,
    ) -> Result<JammingVerdict, LinkError>;

    /// Frequency (where configurable), data-rate range and enable.
    async fn configure_channel(&mut self, channel_id: u8, frequency_hz: u32)
        -> Result<(), LinkError>;

    async fn enable_only_channel(&mut self, channel_id: u8) -> Result<(), LinkError>;

    async fn save_configuration(&mut self) -> Result<(), LinkError>;

    async fn verify_channel(&mut self, channel_id: u8) -> ChannelReport;
}

#[async_trait]
impl<P: SerialLink> RawRadio for LineProtocolClient<P> {
    async fn pause_mac(&mut self) -> Result<MacPause, LinkError> {
        LineProtocolClient::pause_mac(self).await
    }

    async fn resume_mac(&mut self) -> Result<(), LinkError> {
        LineProtocolClient::resume_mac(self).await
    }

    async fn detect_jamming(
        &mut self,
        frequency_hz: u32,
        detector: &JammingDetector,
    ) -> Result<JammingVerdict, LinkError> {
        LineProtocolClient::detect_jamming(self, frequency_hz, detector).await
    }

    async fn configure_channel(
        &mut self,
        channel_id: u8,
        frequency_hz: u32,
    ) -> Result<(), LinkError> {
        self.configure_eu868_channel(channel_id, frequency_hz).await
    }

    async fn enable_only_channel(&mut self, channel_id: u8) -> Result<(), LinkError> {
        LineProtocolClient::enable_only_channel(self, channel_id).await
    }

    async fn save_configuration(&mut self) -> Result<(), LinkError> {
        LineProtocolClient::save_configuration(self).await
    }

    async fn verify_channel(&mut self, channel_id: u8) -> ChannelReport {
        LineProtocolClient::verify_channel(self, channel_id).await
    }
}

#[async_trait]
impl<T: RawRadio> RawRadio for Arc<tokio::sync::Mutex<T>> {
    async fn pause_mac(&mut self) -> Result<MacPause, LinkError> {
        self.lock().await.pause_mac().await
    }

    async fn resume_mac(&mut self) -> Result<(), LinkError> {
        self.lock().await.resume_mac().await
    }

    async fn detect_jamming(
        &mut self,
        frequency_hz: u32,
        detector: &JammingDetector,
    ) -> Result<JammingVerdict, LinkError> {
        self.lock()
            .await
            .detect_jamming(frequency_hz, detector)
            .await
    }

    async fn configure_channel(
        &mut self,
        channel_id: u8,
        frequency_hz: u32,
    ) -> Result<(), LinkError> {
        self.lock()
            .await
            .configure_channel(channel_id, frequency_hz)
            .await
    }

    async fn enable_only_channel(&mut self, channel_id: u8) -> Result<(), LinkError> {
        self.lock().await.enable_only_channel(channel_id).await
    }

    async fn save_configuration(&mut self) -> Result<(), LinkError> {
        self.lock().await.save_configuration().await
    }

    async fn verify_channel(&mut self, channel_id: u8) -> ChannelReport {
        self.lock().await.verify_channel(channel_id).await
    }
}

/// One recorded raw radio operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    PauseMac,
    ResumeMac,
    DetectJamming(u32),
    ConfigureChannel(u8),
    EnableOnlyChannel(u8),
    SaveConfiguration,
    VerifyChannel(u8),
}

/// Scripted raw radio for strategy tests; clones share state.
#[derive(Clone)]
pub struct MockRadio {
    pub calls: Arc<Mutex<Vec<RadioCall>>>,
    /// Frequencies the probe reports as jammed.
    pub jammed: Arc<Mutex<HashSet<u32>>>,
    /// Frequencies whose probe fails outright.
    pub probe_errors: Arc<Mutex<HashSet<u32>>>,
    /// Channels whose configuration is refused.
    pub refuse_config: Arc<Mutex<HashSet<u8>>>,
    /// `None` makes `mac pause` fail.
    pub pause_window_ms: Arc<Mutex<Option<u64>>>,
    pub save_fails: Arc<Mutex<bool>>,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRadio {
    pub fn new() -> Self {
        MockRadio {
            calls: Arc::new(Mutex::new(Vec::new())),
            jammed: Arc::new(Mutex::new(HashSet::new())),
            probe_errors: Arc::new(Mutex::new(HashSet::new())),
            refuse_config: Arc::new(Mutex::new(HashSet::new())),
            pause_window_ms: Arc::new(Mutex::new(Some(u64::from(u32::MAX)))),
            save_fails: Arc::new(Mutex::new(false)),
        }
    }

    pub fn jam(&self, frequency_hz: u32) {
        self.jammed.lock().unwrap().insert(frequency_hz);
    }

    pub fn jam_all(&self, frequencies: &[u32]) {
        self.jammed.lock().unwrap().extend(frequencies.iter().copied());
    }

    pub fn fail_probe(&self, frequency_hz: u32) {
        self.probe_errors.lock().unwrap().insert(frequency_hz);
    }

    pub fn refuse_channel(&self, channel_id: u8) {
        self.refuse_config.lock().unwrap().insert(channel_id);
    }

    pub fn set_pause_window(&self, window_ms: Option<u64>) {
        *self.pause_window_ms.lock().unwrap() = window_ms;
    }

    pub fn set_save_fails(&self, fails: bool) {
        *self.save_fails.lock().unwrap() = fails;
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Frequencies probed, in order.
    pub fn probed(&self) -> Vec<u32> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                RadioCall::DetectJamming(f) => Some(*f),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RadioCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RawRadio for MockRadio {
    async fn pause_mac(&mut self) -> Result<MacPause, LinkError> {
        self.record(RadioCall::PauseMac);
        match *self.pause_window_ms.lock().unwrap() {
            Some(window_ms) => Ok(MacPause { window_ms }),
            None => Err(LinkError::Timeout {
                command: "mac pause".into(),
                waited_ms: 0,
            }),
        }
    }

    async fn resume_mac(&mut self) -> Result<(), LinkError> {
        self.record(RadioCall::ResumeMac);
        Ok(())
    }

    async fn detect_jamming(
        &mut self,
        frequency_hz: u32,
        detector: &JammingDetector,
    ) -> Result<JammingVerdict, LinkError> {
        self.record(RadioCall::DetectJamming(frequency_hz));
        if self.probe_errors.lock().unwrap().contains(&frequency_hz) {
            return Err(LinkError::Rejected {
                command: "radio set freq".into(),
                response: "invalid_param".into(),
            });
        }

        let jammed = self.jammed.lock().unwrap().contains(&frequency_hz);
        let evidence = match detector {
            JammingDetector::TriggerAndListen(cfg) => Evidence::Reactive {
                trials: cfg.trials,
                reactive_trials: if jammed { cfg.trials } else { 0 },
            },
            JammingDetector::CompositeScoring(cfg) => Evidence::Composite {
                peak_window_events: if jammed { cfg.activity_threshold + 1 } else { 0 },
                passive_flag: jammed,
                completed_transmissions: cfg.timing_trials,
                timing_spread_ms: 0,
                timing_flag: false,
                repeat_failures: 0,
                repeat_flag: false,
                score: if jammed { u16::from(cfg.passive_weight) } else { 0 },
            },
        };
        Ok(JammingVerdict { jammed, evidence })
    }

    async fn configure_channel(
        &mut self,
        channel_id: u8,
        _frequency_hz: u32,
    ) -> Result<(), LinkError> {
        self.record(RadioCall::ConfigureChannel(channel_id));
        if self.refuse_config.lock().unwrap().contains(&channel_id) {
            return Err(LinkError::Rejected {
                command: format!("mac set ch status {channel_id} on"),
                response: "invalid_param".into(),
            });
        }
        Ok(())
    }

    async fn enable_only_channel(&mut self, channel_id: u8) -> Result<(), LinkError> {
        self.record(RadioCall::EnableOnlyChannel(channel_id));
        Ok(())
    }

    async fn save_configuration(&mut self) -> Result<(), LinkError> {
        self.record(RadioCall::SaveConfiguration);
        if *self.save_fails.lock().unwrap() {
            return Err(LinkError::Rejected {
                command: "mac save".into(),
                response: "invalid_param".into(),
            });
        }
        Ok(())
    }

    async fn verify_channel(&mut self, channel_id: u8) -> ChannelReport {
        self.record(RadioCall::VerifyChannel(channel_id));
        ChannelReport {
            channel_id,
            status: Some("on".into()),
            frequency: None,
        }
    }
}
