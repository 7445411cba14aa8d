//! # Result Classification
//!
//! Maps each [`ResultCode`] to exactly one [`Classification`] and applies the
//! shared side effects of an attempt in [`TransmissionCore`]: statistics,
//! status colour, message counter and the settle delay owed to the module.

use super::stats::TransmissionStats;
use crate::config::BackoffPolicy;
use crate::error::LoRaError;
use crate::modem::{parse_counter, FrameCounters, LoRaModem, ResultCode};
use crate::util::clock::Clock;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a strategy must react to an attempt's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Success,
    /// Transient; another attempt may succeed unchanged.
    RetryableSoft,
    /// Delivered but not acknowledged; candidate for parameter escalation.
    RetryableNoAck,
    /// This payload will never go through; do not retry.
    Rejected,
    /// The link is unusable until the caller intervenes.
    Fatal,
}

impl ResultCode {
    pub fn classify(self) -> Classification {
        match self {
            ResultCode::Success => Classification::Success,
            ResultCode::NoResponse
            | ResultCode::Timeout
            | ResultCode::Busy
            | ResultCode::Silent
            | ResultCode::NoFreeChannel
            | ResultCode::Unknown => Classification::RetryableSoft,
            ResultCode::NoAcknowledgment => Classification::RetryableNoAck,
            ResultCode::PayloadTooLarge => Classification::Rejected,
            ResultCode::InternalError | ResultCode::NetworkFatal | ResultCode::NotConnected => {
                Classification::Fatal
            }
        }
    }
}

/// Status LED colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const SUCCESS: Rgb = Rgb(0x00, 0xFF, 0x00);
    pub const TRANSIENT: Rgb = Rgb(0xFF, 0xFF, 0x00);
    pub const FATAL: Rgb = Rgb(0xFF, 0x00, 0x00);
    pub const NO_FREE_CHANNEL: Rgb = Rgb(0xFF, 0x60, 0x00);
    pub const NO_ACK: Rgb = Rgb(0xFF, 0xB0, 0x50);
    pub const UNKNOWN: Rgb = Rgb(0x00, 0x7F, 0xFF);
    pub const SENDING: Rgb = Rgb(0x00, 0xFF, 0x7F);

    /// Colour shown after an attempt that produced `code`.
    pub fn for_code(code: ResultCode) -> Rgb {
        match code {
            ResultCode::Success => Rgb::SUCCESS,
            ResultCode::NoResponse | ResultCode::Timeout | ResultCode::Busy | ResultCode::Silent => {
                Rgb::TRANSIENT
            }
            ResultCode::NoFreeChannel => Rgb::NO_FREE_CHANNEL,
            ResultCode::NoAcknowledgment => Rgb::NO_ACK,
            ResultCode::Unknown => Rgb::UNKNOWN,
            ResultCode::PayloadTooLarge
            | ResultCode::InternalError
            | ResultCode::NetworkFatal
            | ResultCode::NotConnected => Rgb::FATAL,
        }
    }
}

/// Status signal sink, typically an RGB LED.
pub type Indicator = Arc<dyn Fn(Rgb) + Send + Sync>;

/// Indicator that discards every colour.
pub fn silent_indicator() -> Indicator {
    Arc::new(|_| {})
}

/// State and behaviour shared by every strategy.
pub struct TransmissionCore {
    modem: Arc<dyn LoRaModem>,
    indicator: Indicator,
    clock: Arc<dyn Clock>,
    backoff: BackoffPolicy,
    stats: TransmissionStats,
    message_counter: u8,
}

impl TransmissionCore {
    pub fn new(
        modem: Arc<dyn LoRaModem>,
        indicator: Indicator,
        clock: Arc<dyn Clock>,
        backoff: BackoffPolicy,
    ) -> Self {
        TransmissionCore {
            modem,
            indicator,
            clock,
            backoff,
            stats: TransmissionStats::new(),
            message_counter: 0,
        }
    }

    pub fn modem(&self) -> &dyn LoRaModem {
        self.modem.as_ref()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn signal(&self, colour: Rgb) {
        (self.indicator)(colour);
    }

    pub fn signal_sending(&self) {
        self.signal(Rgb::SENDING);
    }

    pub fn stats(&self) -> &TransmissionStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    pub fn message_counter(&self) -> u8 {
        self.message_counter
    }

    pub fn set_message_counter(&mut self, value: u8) {
        self.message_counter = value;
    }

    /// Apply uplink settings. Setters are best effort: a refused setting is
    /// logged and the remaining ones are still applied.
    pub async fn configure(&self, coding_rate: &str, sf: u8, power_index: u8, fsb: u8) -> bool {
        info!(
            "Config: CR:{} SF:{} PWR:{} FSB:{}",
            coding_rate, sf, power_index, fsb
        );

        let mut all_applied = true;
        if !self.modem.set_spreading_factor(sf).await {
            warn!("Spreading factor {} not applied", sf);
            all_applied = false;
        }
        if !self.modem.set_power_index(power_index).await {
            warn!("Power index {} not applied", power_index);
            all_applied = false;
        }
        if !self.modem.set_fsb_channels(fsb).await {
            warn!("Sub-band {} not applied", fsb);
            all_applied = false;
        }
        if !self.modem.set_coding_rate(coding_rate).await {
            warn!("Coding rate {} not applied", coding_rate);
            all_applied = false;
        }
        all_applied
    }

    /// Account for one attempt made at `sf` that produced `code`.
    ///
    /// Waits out the settle delay before returning; fatal codes return
    /// [`LoRaError::LinkHalted`] immediately.
    pub async fn handle(&mut self, code: ResultCode, sf: u8) -> Result<Classification, LoRaError> {
        let class = code.classify();
        self.stats.record_attempt(sf);
        info!("LoRa transmission result: {}", code);

        match code {
            ResultCode::Success => {
                self.stats.record_success();
                self.message_counter = self.message_counter.wrapping_add(1);
                info!("Successful transmission (message counter {})", self.message_counter);
            }
            ResultCode::NoResponse => warn!("No response from the module"),
            ResultCode::Timeout => warn!("Connection timed out, check the serial link"),
            ResultCode::Busy => warn!("Module busy"),
            ResultCode::Silent => warn!("Module silent"),
            ResultCode::NoFreeChannel => warn!("No free channel"),
            ResultCode::NoAcknowledgment => {
                self.stats.record_failure();
                warn!("No acknowledgement received");
            }
            ResultCode::Unknown => warn!("Unrecognised result code"),
            ResultCode::PayloadTooLarge => error!("Payload larger than allowed, not retrying"),
            ResultCode::InternalError => error!("Internal module error, restart the module"),
            ResultCode::NetworkFatal => error!("Unrecoverable network error, rejoin required"),
            ResultCode::NotConnected => error!("Not joined to a network"),
        }

        self.signal(Rgb::for_code(code));

        if class == Classification::Fatal {
            return Err(LoRaError::LinkHalted(code));
        }

        let delay = self.backoff.delay_for(code);
        if !delay.is_zero() {
            debug!("Settling for {} ms", delay.as_millis());
            self.clock.sleep(delay).await;
        }
        Ok(class)
    }

    /// Read the session frame counters; missing replies read as 0.
    pub async fn fetch_frame_counters(&self) -> FrameCounters {
        let downlink = self.modem.get_mac_param("dnctr").await;
        let uplink = self.modem.get_mac_param("upctr").await;
        let counters = FrameCounters {
            downlink: parse_counter(downlink.as_deref()),
            uplink: parse_counter(uplink.as_deref()),
        };
        info!(
            "Frame counters: downlink {}, uplink {}",
            counters.downlink, counters.uplink
        );
        counters
    }
}
