//! # Hex Payload Helpers
//!
//! The module's `radio tx` command takes its payload as ASCII hex. These
//! helpers encode raw bytes for the wire, validate caller-supplied hex before it
//! is framed into a command, and format bytes compactly for log lines.
//!
//! ```rust
//! use lora_reliable::util::hex::{encode_radio_payload, validate_radio_hex};
//!
//! let payload = encode_radio_payload(&[0x01, 0x02, 0xAB]);
//! assert_eq!(payload, "0102AB");
//! assert!(validate_radio_hex(&payload).is_ok());
//! assert!(validate_radio_hex("0102A").is_err());
//! ```

use thiserror::Error;

/// Longest payload (in bytes) accepted by `radio tx`.
pub const MAX_RADIO_PAYLOAD: usize = 255;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Invalid hex character: {0}")]
    InvalidCharacter(char),

    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Payload too long: {0} bytes")]
    TooLong(usize),
}

/// Encode bytes as the uppercase hex the module expects.
pub fn encode_radio_payload(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Check that `hex_str` can be sent verbatim after `radio tx `.
pub fn validate_radio_hex(hex_str: &str) -> Result<(), HexError> {
    if hex_str.is_empty() {
        return Err(HexError::EmptyString);
    }
    if let Some(c) = hex_str.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(HexError::InvalidCharacter(c));
    }
    if hex_str.len() % 2 != 0 {
        return Err(HexError::OddLength(hex_str.len()));
    }
    if hex_str.len() / 2 > MAX_RADIO_PAYLOAD {
        return Err(HexError::TooLong(hex_str.len() / 2));
    }
    Ok(())
}

/// Format hex data for compact display (useful for logs)
///
/// Formats data as "68 31 31 68" with spaces between bytes.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a payload for narration: printable ASCII as text, anything else as hex.
pub fn describe_payload(data: &[u8]) -> String {
    if !data.is_empty() && data.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        String::from_utf8_lossy(data).into_owned()
    } else {
        format_hex_compact(data)
    }
}
