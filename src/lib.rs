//! # lora-reliable - Transmission Reliability for RN2483-class LoRa Modules
//!
//! The lora-reliable crate wraps a LoRaWAN modem that speaks an ASCII command
//! protocol over a serial line and adds policies for getting uplinks through
//! on a noisy or hostile channel.
//!
//! ## Features
//!
//! - Line protocol driver with tiered timeouts, two-phase `radio tx` and MAC
//!   pause/resume
//! - Jamming probes (trigger-and-listen, composite scoring) on a paused MAC
//! - EU868 channel failure tracking with 30 minute aging
//! - Standard, Retry, Dynamic SF/CR and Listen-Before-Talk strategies sharing
//!   one result classifier
//! - Injectable clock so regulatory waits can be tested without sleeping
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! lora-reliable = "0.1.0"
//! ```
//!
//! The LoRaWAN modem driver is supplied by the caller as any [`LoRaModem`]
//! implementation; the serial port is only used for raw radio work.
//!
//! ```rust,no_run
//! use lora_reliable::{
//!     config::EngineConfig, link::open_serial, strategy::silent_indicator,
//!     util::TokioClock, LbtStrategy, LoRaError, LoRaModem, TransmissionCore,
//!     TransmissionStrategy,
//! };
//! use std::sync::Arc;
//!
//! async fn run(modem: Arc<dyn LoRaModem>) -> Result<bool, LoRaError> {
//!     let config = EngineConfig::default();
//!     let radio = open_serial("/dev/ttyUSB0", &config.link)?;
//!     let core = TransmissionCore::new(
//!         modem,
//!         silent_indicator(),
//!         Arc::new(TokioClock),
//!         config.backoff.clone(),
//!     );
//!     let mut lbt = LbtStrategy::new(core, radio, config.lbt.clone());
//!     lbt.send_message(1, b"reading=42").await
//! }
//! ```

pub mod channel;
pub mod config;
pub mod constants;
pub mod error;
pub mod link;
pub mod logging;
pub mod modem;
pub mod strategy;
pub mod util;

pub use crate::error::{LinkError, LoRaError};
pub use crate::logging::{init_logger, log_info};

pub use channel::{ChannelSelector, ChannelState};
pub use config::EngineConfig;
pub use link::{LineProtocolClient, RawRadio};
pub use modem::{FrameCounters, LoRaModem, ResultCode};
pub use strategy::{
    Classification, DynamicStrategy, LbtStrategy, RetryStrategy, StandardStrategy,
    TransmissionCore, TransmissionStrategy,
};
