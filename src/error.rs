//! # Error Handling
//!
//! This module defines the error types used across the crate: [`LinkError`] for
//! the serial line protocol and [`LoRaError`] for the transmission layer.

use crate::modem::ResultCode;
use crate::util::hex::HexError;
use thiserror::Error;

/// Failures of a single command/response exchange with the module.
///
/// None of these are retried by the link layer; retry belongs to the strategies.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Underlying I/O failure on the serial port.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial port could not be opened or configured.
    #[error("Serial port error: {0}")]
    SerialPort(String),

    /// No complete CR-LF terminated line arrived in time.
    #[error("Timeout after {waited_ms} ms waiting for reply to '{command}'")]
    Timeout { command: String, waited_ms: u64 },

    /// The module answered, but not with the expected acknowledgement.
    #[error("Command '{command}' rejected: {response}")]
    Rejected { command: String, response: String },

    /// Transmission was accepted but the module reported `radio_err`.
    #[error("Radio transmission failed")]
    TransmitFailed,

    /// A reply that could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Payload could not be framed into a `radio tx` command.
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] HexError),
}

impl LinkError {
    /// True for the timeout tier, as opposed to an explicit module answer.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout { .. })
    }
}

/// Crate-level error returned by strategies and configuration loading.
#[derive(Debug, Error)]
pub enum LoRaError {
    /// A fatal result code: no further attempts are valid on this link until
    /// the caller reconnects or restarts the module.
    #[error("Link halted by fatal result code {0:?}")]
    LinkHalted(ResultCode),

    /// Failure in the raw line protocol.
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File access while loading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoRaError {
    /// True if the caller must intervene before using the link again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoRaError::LinkHalted(_))
    }
}

impl From<serde_json::Error> for LoRaError {
    fn from(e: serde_json::Error) -> Self {
        LoRaError::Config(e.to_string())
    }
}
