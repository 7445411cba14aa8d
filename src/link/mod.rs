//! # Serial Link Layer
//!
//! Driver for the module's ASCII command protocol over a serial port:
//!
//! - [`client`]: command/response exchanges, MAC pause/resume, raw radio and
//!   channel plan commands
//! - [`jamming`]: trigger-and-listen and composite-scoring jamming probes
//! - [`raw_radio`]: the [`RawRadio`] capability and its mutex gate
//! - [`serial_mock`]: scripted port for tests

pub mod client;
pub mod jamming;
pub mod raw_radio;
pub mod serial_mock;

pub use client::{open_serial, ChannelReport, LineProtocolClient, MacPause, ReceiveEvent, SerialLink};
pub use jamming::{CompositeConfig, Evidence, JammingDetector, JammingVerdict, TriggerListenConfig};
pub use raw_radio::{MockRadio, RadioCall, RawRadio};
pub use serial_mock::ScriptedPort;
