//! # LoRaWAN Modem Capability
//!
//! The vendor module's LoRaWAN command set (joined uplinks, MAC parameter
//! access) is an external collaborator. This module defines the surface the
//! strategies consume, [`LoRaModem`], and the per-attempt [`ResultCode`] it
//! produces.

pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use mock::{MockModem, ModemCall};

/// Outcome of one uplink attempt, as reported by the module driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    Success,
    NoResponse,
    Timeout,
    PayloadTooLarge,
    InternalError,
    Busy,
    Silent,
    NoFreeChannel,
    NetworkFatal,
    NotConnected,
    NoAcknowledgment,
    Unknown,
}

impl ResultCode {
    /// Every code, in numeric order.
    pub const ALL: [ResultCode; 12] = [
        ResultCode::Success,
        ResultCode::NoResponse,
        ResultCode::Timeout,
        ResultCode::PayloadTooLarge,
        ResultCode::InternalError,
        ResultCode::Busy,
        ResultCode::NetworkFatal,
        ResultCode::NotConnected,
        ResultCode::NoAcknowledgment,
        ResultCode::Silent,
        ResultCode::NoFreeChannel,
        ResultCode::Unknown,
    ];

    /// Map the numeric code of the vendor driver.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ResultCode::Success,
            1 => ResultCode::NoResponse,
            2 => ResultCode::Timeout,
            3 => ResultCode::PayloadTooLarge,
            4 => ResultCode::InternalError,
            5 => ResultCode::Busy,
            6 => ResultCode::NetworkFatal,
            7 => ResultCode::NotConnected,
            8 => ResultCode::NoAcknowledgment,
            9 => ResultCode::Silent,
            10 => ResultCode::NoFreeChannel,
            _ => ResultCode::Unknown,
        }
    }

    /// Numeric code of the vendor driver (`Unknown` maps to 0xFF).
    pub fn code(self) -> u8 {
        match self {
            ResultCode::Success => 0,
            ResultCode::NoResponse => 1,
            ResultCode::Timeout => 2,
            ResultCode::PayloadTooLarge => 3,
            ResultCode::InternalError => 4,
            ResultCode::Busy => 5,
            ResultCode::NetworkFatal => 6,
            ResultCode::NotConnected => 7,
            ResultCode::NoAcknowledgment => 8,
            ResultCode::Silent => 9,
            ResultCode::NoFreeChannel => 10,
            ResultCode::Unknown => 0xFF,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Uplink/downlink frame counters of the LoRaWAN session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameCounters {
    pub downlink: u32,
    pub uplink: u32,
}

/// LoRaWAN-level operations of the radio module.
///
/// Setters are best effort and report acceptance as `bool`; the send calls
/// always produce a [`ResultCode`].
#[async_trait]
pub trait LoRaModem: Send + Sync {
    /// Unconfirmed uplink.
    async fn send(&self, port: u8, payload: &[u8]) -> ResultCode;

    /// Confirmed uplink; `retries` is the module's own retransmission count.
    async fn send_req_ack(&self, port: u8, payload: &[u8], retries: u8) -> ResultCode;

    async fn set_spreading_factor(&self, sf: u8) -> bool;

    async fn set_power_index(&self, index: u8) -> bool;

    async fn set_fsb_channels(&self, fsb: u8) -> bool;

    async fn set_coding_rate(&self, cr: &str) -> bool;

    /// Raw `mac get <name>` reply, `None` when the module did not answer.
    async fn get_mac_param(&self, name: &str) -> Option<String>;
}

/// Parse a decimal counter reply; anything unparseable reads as 0.
pub(crate) fn parse_counter(reply: Option<&str>) -> u32 {
    reply
        .map(str::trim)
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping_is_bijective_for_known_codes() {
        for code in ResultCode::ALL {
            if code != ResultCode::Unknown {
                assert_eq!(ResultCode::from_code(code.code()), code);
            }
        }
        assert_eq!(ResultCode::from_code(42), ResultCode::Unknown);
    }

    #[test]
    fn test_parse_counter() {
        assert_eq!(parse_counter(Some("17")), 17);
        assert_eq!(parse_counter(Some(" 42 ")), 42);
        assert_eq!(parse_counter(Some("invalid_param")), 0);
        assert_eq!(parse_counter(None), 0);
    }
}
