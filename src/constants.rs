//! Protocol and Policy Constants
//!
//! Timeout tiers of the module's text protocol, the EU868 channel plan, and
//! the default thresholds of the reliability policies.

// ----------------------------------------------------------------------------
// Wire protocol
// ----------------------------------------------------------------------------

/// Line terminator for commands and responses.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Longest response line accepted before the exchange is declared invalid.
pub const MAX_LINE_LEN: usize = 256;

/// Default baud rate of RN2483-class modules.
pub const DEFAULT_BAUDRATE: u32 = 57_600;

// Timeout tiers (milliseconds)
pub const POLL_TIMEOUT_MS: u64 = 100;
pub const SHORT_TIMEOUT_MS: u64 = 500;
pub const CONTROL_TIMEOUT_MS: u64 = 1000;
pub const TX_ACCEPT_TIMEOUT_MS: u64 = 2000;
pub const TX_COMPLETE_TIMEOUT_MS: u64 = 8000;

/// Upper bound on time spent discarding stale input before a command.
pub const FLUSH_WINDOW_MS: u64 = 100;

// ----------------------------------------------------------------------------
// MAC pause
// ----------------------------------------------------------------------------

/// Below this pause window there is no time for a jamming probe.
pub const MIN_PAUSE_WINDOW_MS: u64 = 3000;

/// Above this value the MAC is idle and can be paused indefinitely.
pub const INDEFINITE_PAUSE_MS: u64 = 4_200_000_000;

// ----------------------------------------------------------------------------
// EU868 channel plan
// ----------------------------------------------------------------------------

/// Number of individually addressable EU868 uplink channels.
pub const EU868_CHANNEL_COUNT: usize = 8;

/// Channel frequencies in Hz, indexed by LoRaWAN channel id.
/// Channels 0-2 are the mandatory defaults, 3-7 are configurable.
pub const EU868_FREQUENCIES: [u32; EU868_CHANNEL_COUNT] = [
    868_100_000,
    868_300_000,
    868_500_000,
    867_100_000,
    867_300_000,
    867_500_000,
    867_700_000,
    867_900_000,
];

/// First channel id whose frequency must be programmed explicitly.
pub const EU868_FIRST_CONFIGURABLE_CHANNEL: u8 = 3;

/// EU868 data-rate range enabled on a locked channel (DR0..DR5).
pub const EU868_MIN_DR: u8 = 0;
pub const EU868_MAX_DR: u8 = 5;

/// Failures older than this are forgotten (30 minutes).
pub const CHANNEL_FAILURE_AGING_MS: u64 = 30 * 60 * 1000;

// ----------------------------------------------------------------------------
// Transmission parameters
// ----------------------------------------------------------------------------

pub const MIN_SF: u8 = 9;
pub const MAX_SF: u8 = 12;

/// Size of the per-spreading-factor histogram.
pub const SF_BUCKETS: usize = (MAX_SF - MIN_SF + 1) as usize;

/// Coding rates in escalation order.
pub const CODING_RATES: [&str; 4] = ["4/5", "4/6", "4/7", "4/8"];

/// Power index 1 is 14 dBm on EU868.
pub const DEFAULT_POWER_INDEX: u8 = 1;
pub const DEFAULT_FSB: u8 = 0;

/// Raw radio settings used for jamming probes.
pub const PROBE_BANDWIDTH_KHZ: u16 = 125;
pub const PROBE_SYNC_WORD: u8 = 34;
