//! # Transmission Strategies
//!
//! Each strategy turns "deliver this payload" into a sequence of configure,
//! attempt and classify steps against the modem:
//!
//! - [`StandardStrategy`]: one unconfirmed attempt
//! - [`RetryStrategy`]: confirmed attempts with a shared retry budget
//! - [`DynamicStrategy`]: escalates one radio parameter on missing acknowledgements
//! - [`LbtStrategy`]: probes channels for jamming and locks onto a clear one
//!
//! All of them share a [`TransmissionCore`] for statistics, status colours,
//! the message counter and regulatory settle delays.
//!
//! ```rust
//! use lora_reliable::config::BackoffPolicy;
//! use lora_reliable::modem::{MockModem, ResultCode};
//! use lora_reliable::strategy::{silent_indicator, StandardStrategy, TransmissionCore, TransmissionStrategy};
//! use lora_reliable::util::clock::ManualClock;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let modem = MockModem::new();
//! modem.queue_results(&[ResultCode::Success]);
//!
//! let core = TransmissionCore::new(
//!     Arc::new(modem.clone()),
//!     silent_indicator(),
//!     Arc::new(ManualClock::new()),
//!     BackoffPolicy::default(),
//! );
//! let mut strategy = StandardStrategy::new(core);
//! assert!(strategy.send_message(1, b"hello").await.unwrap());
//! assert_eq!(strategy.message_counter(), 1);
//! # });
//! ```

pub mod classifier;
pub mod dynamic;
pub mod lbt;
pub mod retry;
pub mod standard;
pub mod stats;

use crate::constants::{CODING_RATES, DEFAULT_FSB, DEFAULT_POWER_INDEX, MIN_SF};
use crate::error::LoRaError;
use crate::modem::FrameCounters;
use async_trait::async_trait;

pub use classifier::{silent_indicator, Classification, Indicator, Rgb, TransmissionCore};
pub use dynamic::{CodingRatePolicy, DynamicStrategy, ParameterPolicy, SpreadingFactorPolicy};
pub use lbt::{JammingStats, LbtStrategy};
pub use retry::RetryStrategy;
pub use standard::StandardStrategy;
pub use stats::TransmissionStats;

/// Uplink radio settings applied before an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UplinkSettings {
    pub coding_rate: &'static str,
    pub spreading_factor: u8,
    pub power_index: u8,
    pub fsb: u8,
}

impl Default for UplinkSettings {
    /// CR 4/5, SF9, power index 1, all sub-bands.
    fn default() -> Self {
        UplinkSettings {
            coding_rate: CODING_RATES[0],
            spreading_factor: MIN_SF,
            power_index: DEFAULT_POWER_INDEX,
            fsb: DEFAULT_FSB,
        }
    }
}

impl TransmissionCore {
    pub async fn apply_settings(&self, settings: &UplinkSettings) -> bool {
        self.configure(
            settings.coding_rate,
            settings.spreading_factor,
            settings.power_index,
            settings.fsb,
        )
        .await
    }
}

/// A policy for delivering one payload.
///
/// `send_message` returns `Ok(true)` on confirmed delivery, `Ok(false)` when
/// the policy gave up, and `Err` only when the link must not be used again
/// without intervention.
#[async_trait]
pub trait TransmissionStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn send_message(&mut self, port: u8, payload: &[u8]) -> Result<bool, LoRaError>;

    async fn fetch_frame_counters(&self) -> FrameCounters;

    fn core(&self) -> &TransmissionCore;

    fn core_mut(&mut self) -> &mut TransmissionCore;

    fn stats(&self) -> &TransmissionStats {
        self.core().stats()
    }

    fn message_counter(&self) -> u8 {
        self.core().message_counter()
    }

    fn set_message_counter(&mut self, value: u8) {
        self.core_mut().set_message_counter(value);
    }

    fn log_statistics(&self) {
        self.core().stats().log_summary(self.name());
    }
}
