//! # Utility Modules
//!
//! Time source abstraction and hex helpers for `radio tx` payloads.

pub mod clock;
pub mod hex;

pub use clock::{Clock, ManualClock, TokioClock};
pub use hex::{describe_payload, encode_radio_payload, format_hex_compact, validate_radio_hex, HexError};
