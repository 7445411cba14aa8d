//! # Engine Configuration
//!
//! All tunables of the link driver and the strategies. Defaults reproduce the
//! reference field deployment; a JSON file may override any subset of fields.
//!
//! ```rust
//! use lora_reliable::config::EngineConfig;
//!
//! let config: EngineConfig = serde_json::from_str(r#"{ "retry": { "max_retries": 5 } }"#).unwrap();
//! assert_eq!(config.retry.max_retries, 5);
//! assert_eq!(config.lbt.max_channel_attempts, 8);
//! ```

use crate::constants::*;
use crate::error::LoRaError;
use crate::link::jamming::JammingDetector;
use crate::modem::ResultCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Serial link settings and timeout tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub baudrate: u32,
    /// Non-blocking receive polls.
    pub poll_timeout_ms: u64,
    /// `radio sleep`, `radio get snr`.
    pub short_timeout_ms: u64,
    /// Ordinary control commands.
    pub control_timeout_ms: u64,
    /// First phase of `radio tx`.
    pub tx_accept_timeout_ms: u64,
    /// Second phase of `radio tx` (on-air completion).
    pub tx_complete_timeout_ms: u64,
    pub flush_window_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            baudrate: DEFAULT_BAUDRATE,
            poll_timeout_ms: POLL_TIMEOUT_MS,
            short_timeout_ms: SHORT_TIMEOUT_MS,
            control_timeout_ms: CONTROL_TIMEOUT_MS,
            tx_accept_timeout_ms: TX_ACCEPT_TIMEOUT_MS,
            tx_complete_timeout_ms: TX_COMPLETE_TIMEOUT_MS,
            flush_window_ms: FLUSH_WINDOW_MS,
        }
    }
}

/// Settle delay applied after each classified attempt.
///
/// These are regulatory/backoff waits, not incidental latency: they must fully
/// elapse before the next attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub success_ms: u64,
    pub no_response_ms: u64,
    pub timeout_ms: u64,
    pub payload_too_large_ms: u64,
    pub busy_ms: u64,
    pub silent_ms: u64,
    pub no_free_channel_ms: u64,
    pub no_ack_ms: u64,
    pub unknown_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            success_ms: 10_000,
            no_response_ms: 10_000,
            timeout_ms: 20_000,
            payload_too_large_ms: 10_000,
            busy_ms: 10_000,
            silent_ms: 10_000,
            no_free_channel_ms: 10_000,
            no_ack_ms: 10_000,
            unknown_ms: 0,
        }
    }
}

impl BackoffPolicy {
    /// No waiting at all; handy for bench setups.
    pub fn none() -> Self {
        BackoffPolicy {
            success_ms: 0,
            no_response_ms: 0,
            timeout_ms: 0,
            payload_too_large_ms: 0,
            busy_ms: 0,
            silent_ms: 0,
            no_free_channel_ms: 0,
            no_ack_ms: 0,
            unknown_ms: 0,
        }
    }

    /// Delay owed after an attempt that produced `code`. Fatal codes owe none.
    pub fn delay_for(&self, code: ResultCode) -> Duration {
        let ms = match code {
            ResultCode::Success => self.success_ms,
            ResultCode::NoResponse => self.no_response_ms,
            ResultCode::Timeout => self.timeout_ms,
            ResultCode::PayloadTooLarge => self.payload_too_large_ms,
            ResultCode::Busy => self.busy_ms,
            ResultCode::Silent => self.silent_ms,
            ResultCode::NoFreeChannel => self.no_free_channel_ms,
            ResultCode::NoAcknowledgment => self.no_ack_ms,
            ResultCode::Unknown => self.unknown_ms,
            ResultCode::InternalError | ResultCode::NetworkFatal | ResultCode::NotConnected => 0,
        };
        Duration::from_millis(ms)
    }
}

/// Bounds of the Retry and Dynamic strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts of the Retry strategy, shared by every retryable code.
    pub max_retries: u8,
    /// NoAck attempts per parameter value for the retrying Dynamic wrapper.
    pub attempts_per_value: u8,
    /// Soft errors tolerated per message by the Dynamic strategies.
    pub soft_retry_limit: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            attempts_per_value: 3,
            soft_retry_limit: 10,
        }
    }
}

/// Listen-Before-Talk strategy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LbtConfig {
    pub max_channel_attempts: u8,
    pub retries_per_channel: u8,
    pub retry_delay_min_ms: u64,
    pub retry_delay_max_ms: u64,
    /// Pause before moving to the next channel.
    pub channel_switch_delay_ms: u64,
    /// Settle time after channel enable commands.
    pub config_settle_ms: u64,
    /// Settle time after `mac save`.
    pub save_settle_ms: u64,
    pub failure_aging_ms: u64,
    pub detector: JammingDetector,
}

impl Default for LbtConfig {
    fn default() -> Self {
        LbtConfig {
            max_channel_attempts: EU868_CHANNEL_COUNT as u8,
            retries_per_channel: 3,
            retry_delay_min_ms: 1000,
            retry_delay_max_ms: 2000,
            channel_switch_delay_ms: 200,
            config_settle_ms: 500,
            save_settle_ms: 200,
            failure_aging_ms: CHANNEL_FAILURE_AGING_MS,
            detector: JammingDetector::default(),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub link: LinkConfig,
    pub backoff: BackoffPolicy,
    pub retry: RetryConfig,
    pub lbt: LbtConfig,
}

impl EngineConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LoRaError> {
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings under which no attempt could ever be made.
    pub fn validate(&self) -> Result<(), LoRaError> {
        if self.retry.max_retries == 0 {
            return Err(LoRaError::Config("retry.max_retries must be > 0".into()));
        }
        if self.retry.attempts_per_value == 0 {
            return Err(LoRaError::Config(
                "retry.attempts_per_value must be > 0".into(),
            ));
        }
        if self.retry.soft_retry_limit == 0 {
            return Err(LoRaError::Config(
                "retry.soft_retry_limit must be > 0".into(),
            ));
        }
        if self.lbt.max_channel_attempts == 0 {
            return Err(LoRaError::Config(
                "lbt.max_channel_attempts must be > 0".into(),
            ));
        }
        if self.lbt.retries_per_channel == 0 {
            return Err(LoRaError::Config(
                "lbt.retries_per_channel must be > 0".into(),
            ));
        }
        if self.lbt.retry_delay_max_ms < self.lbt.retry_delay_min_ms {
            return Err(LoRaError::Config(
                "lbt.retry_delay_max_ms must be >= retry_delay_min_ms".into(),
            ));
        }
        if self.link.tx_complete_timeout_ms == 0 || self.link.control_timeout_ms == 0 {
            return Err(LoRaError::Config("link timeouts must be > 0".into()));
        }
        self.lbt.detector.validate()
    }
}
