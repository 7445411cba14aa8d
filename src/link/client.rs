//! Line protocol driver for RN2483-class modules
//!
//! Every exchange is one command line out and one (or, for `radio tx`, two)
//! CR-LF terminated reply lines back, each under its own timeout tier. The
//! driver never retries; callers decide what a failure means.

use crate::config::LinkConfig;
use crate::constants::*;
use crate::error::LinkError;
use crate::util::clock::{Clock, TokioClock};
use crate::util::hex::{encode_radio_payload, validate_radio_hex};
use bytes::BytesMut;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;

/// Byte stream the driver can talk over.
pub trait SerialLink: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync> SerialLink for T {}

/// Reply to `mac pause`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacPause {
    /// Time the LoRaWAN stack stays paused.
    pub window_ms: u64,
}

impl MacPause {
    /// Long enough to run a jamming probe.
    pub fn is_sufficient(&self) -> bool {
        self.window_ms >= MIN_PAUSE_WINDOW_MS
    }

    /// The MAC was idle and is paused until resumed.
    pub fn is_indefinite(&self) -> bool {
        self.window_ms > INDEFINITE_PAUSE_MS
    }
}

/// Result of one non-blocking receive poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveEvent {
    /// `radio_rx <data>`
    Packet(String),
    /// `radio_err`: the receive window closed without a packet.
    WindowClosed,
    Nothing,
}

/// Informational channel readback; fields are `None` when the module stayed silent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelReport {
    pub channel_id: u8,
    pub status: Option<String>,
    pub frequency: Option<String>,
}

impl ChannelReport {
    pub fn is_enabled(&self) -> bool {
        self.status.as_deref() == Some("on")
    }
}

/// Command/response client over a serial link.
pub struct LineProtocolClient<P: SerialLink> {
    port: P,
    config: LinkConfig,
    clock: Arc<dyn Clock>,
    rx: BytesMut,
    epoch: Instant,
}

/// Open a serial port at 8N1 and wrap it in a client on the tokio clock.
pub fn open_serial(
    path: &str,
    config: &LinkConfig,
) -> Result<LineProtocolClient<tokio_serial::SerialStream>, LinkError> {
    let port = tokio_serial::new(path, config.baudrate)
        .data_bits(tokio_serial::DataBits::Eight)
        .stop_bits(tokio_serial::StopBits::One)
        .parity(tokio_serial::Parity::None)
        .flow_control(tokio_serial::FlowControl::None)
        .timeout(Duration::from_millis(config.control_timeout_ms))
        .open_native_async()
        .map_err(|e| LinkError::SerialPort(format!("{path}: {e}")))?;

    info!("Opened {} at {} baud", path, config.baudrate);
    Ok(LineProtocolClient::new(
        port,
        config.clone(),
        Arc::new(TokioClock),
    ))
}

impl<P: SerialLink> LineProtocolClient<P> {
    pub fn new(port: P, config: LinkConfig, clock: Arc<dyn Clock>) -> Self {
        let epoch = clock.now();
        LineProtocolClient {
            port,
            config,
            clock,
            rx: BytesMut::with_capacity(MAX_LINE_LEN),
            epoch,
        }
    }

    /// Default timeouts on the tokio clock.
    pub fn with_defaults(port: P) -> Self {
        Self::new(port, LinkConfig::default(), Arc::new(TokioClock))
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Milliseconds since the client was created.
    pub fn uptime_ms(&self) -> u64 {
        self.clock.elapsed_ms(self.epoch)
    }

    /// Discard buffered and pending input, spending at most the flush window.
    pub async fn flush_input(&mut self) -> Result<usize, LinkError> {
        let mut discarded = self.rx.len();
        self.rx.clear();

        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.flush_window_ms);
        let mut chunk = [0u8; 64];
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(5), self.port.read(&mut chunk)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        if discarded > 0 {
            debug!("Discarded {} stale byte(s)", discarded);
        }
        Ok(discarded)
    }

    async fn write_line(&mut self, text: &str) -> Result<(), LinkError> {
        debug!("-> {}", text);
        self.port.write_all(text.as_bytes()).await?;
        self.port.write_all(LINE_TERMINATOR.as_bytes()).await?;
        self.port.flush().await?;
        Ok(())
    }

    /// Pop one complete line from the receive buffer, skipping blank lines.
    fn take_line(&mut self) -> Result<Option<String>, LinkError> {
        loop {
            let Some(pos) = self.rx.windows(2).position(|w| w == b"\r\n") else {
                if self.rx.len() > MAX_LINE_LEN {
                    let len = self.rx.len();
                    self.rx.clear();
                    return Err(LinkError::InvalidResponse(format!(
                        "line exceeds {MAX_LINE_LEN} bytes ({len} buffered)"
                    )));
                }
                return Ok(None);
            };

            let raw = self.rx.split_to(pos + 2);
            if pos > MAX_LINE_LEN {
                return Err(LinkError::InvalidResponse(format!(
                    "line exceeds {MAX_LINE_LEN} bytes ({pos})"
                )));
            }
            let line: String = String::from_utf8_lossy(&raw[..pos])
                .chars()
                .filter(|c| *c != '\r')
                .collect();
            let line = line.trim().to_string();
            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
    }

    /// Read one complete line; a partial line is dropped on timeout.
    pub async fn read_line(&mut self, timeout_ms: u64, command: &str) -> Result<String, LinkError> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        let mut chunk = [0u8; 64];
        loop {
            if let Some(line) = self.take_line()? {
                debug!("<- {}", line);
                return Ok(line);
            }

            match tokio::time::timeout_at(deadline, self.port.read(&mut chunk)).await {
                Ok(Ok(n)) if n > 0 => self.rx.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(e.into()),
                // Silence (or end of input) until the deadline.
                Ok(Ok(_)) | Err(_) => {
                    if !self.rx.is_empty() {
                        debug!("Dropping partial line of {} byte(s)", self.rx.len());
                        self.rx.clear();
                    }
                    return Err(LinkError::Timeout {
                        command: command.to_string(),
                        waited_ms: timeout_ms,
                    });
                }
            }
        }
    }

    /// Flush, send `text`, return the first reply line.
    pub async fn send_command(&mut self, text: &str, timeout_ms: u64) -> Result<String, LinkError> {
        self.flush_input().await?;
        self.write_line(text).await?;
        self.read_line(timeout_ms, text).await
    }

    /// Send `text` and require an `ok` reply.
    pub async fn command(&mut self, text: &str, timeout_ms: u64) -> Result<(), LinkError> {
        let reply = self.send_command(text, timeout_ms).await?;
        if reply == "ok" {
            Ok(())
        } else {
            Err(LinkError::Rejected {
                command: text.to_string(),
                response: reply,
            })
        }
    }

    /// Control-tier query returning the raw reply.
    pub async fn query(&mut self, text: &str) -> Result<String, LinkError> {
        let timeout = self.config.control_timeout_ms;
        self.send_command(text, timeout).await
    }

    async fn control(&mut self, text: &str) -> Result<(), LinkError> {
        let timeout = self.config.control_timeout_ms;
        self.command(text, timeout).await
    }

    // ------------------------------------------------------------------
    // MAC pause / resume
    // ------------------------------------------------------------------

    /// Suspend the LoRaWAN stack so raw radio commands are accepted.
    pub async fn pause_mac(&mut self) -> Result<MacPause, LinkError> {
        let timeout = self.config.control_timeout_ms;
        let first = self.send_command("mac pause", timeout).await?;
        let window = if first == "ok" {
            self.read_line(timeout, "mac pause").await?
        } else {
            first
        };

        let window_ms = window.parse::<u64>().map_err(|_| {
            LinkError::InvalidResponse(format!("mac pause window '{window}'"))
        })?;
        let pause = MacPause { window_ms };

        if pause.is_indefinite() {
            debug!("MAC paused indefinitely");
        } else if !pause.is_sufficient() {
            warn!("MAC pause window of {} ms is too short", window_ms);
        } else {
            debug!("MAC paused for {} ms", window_ms);
        }
        Ok(pause)
    }

    pub async fn resume_mac(&mut self) -> Result<(), LinkError> {
        self.control("mac resume").await
    }

    // ------------------------------------------------------------------
    // Raw radio
    // ------------------------------------------------------------------

    pub async fn set_frequency(&mut self, frequency_hz: u32) -> Result<(), LinkError> {
        self.control(&format!("radio set freq {frequency_hz}")).await
    }

    /// Put the radio in LoRa modulation with the given parameters.
    pub async fn set_lora_mode(
        &mut self,
        sf: u8,
        bandwidth_khz: u16,
        coding_rate: &str,
        sync_word: u8,
    ) -> Result<(), LinkError> {
        self.control("radio set mod lora").await?;
        self.control(&format!("radio set sf sf{sf}")).await?;
        self.control(&format!("radio set bw {bandwidth_khz}")).await?;
        self.control(&format!("radio set cr {coding_rate}")).await?;
        self.control(&format!("radio set sync {sync_word}")).await
    }

    /// Two-phase `radio tx`: accepted, then completed on air.
    pub async fn transmit(&mut self, payload_hex: &str) -> Result<(), LinkError> {
        validate_radio_hex(payload_hex)?;
        let command = format!("radio tx {payload_hex}");

        let accept_timeout = self.config.tx_accept_timeout_ms;
        let accepted = self.send_command(&command, accept_timeout).await?;
        if accepted != "ok" {
            // invalid_param, busy, or anything else the module had to say
            debug!("radio tx not accepted: {}", accepted);
            return Err(LinkError::Rejected {
                command,
                response: accepted,
            });
        }

        let complete_timeout = self.config.tx_complete_timeout_ms;
        let completion = self.read_line(complete_timeout, &command).await?;
        match completion.as_str() {
            "radio_tx_ok" => Ok(()),
            "radio_err" => Err(LinkError::TransmitFailed),
            other => Err(LinkError::InvalidResponse(format!(
                "unexpected transmit completion '{other}'"
            ))),
        }
    }

    pub async fn transmit_bytes(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        let hex = encode_radio_payload(payload);
        self.transmit(&hex).await
    }

    /// Open a receive window of `symbols` symbols; 0 keeps it open.
    pub async fn start_receive(&mut self, symbols: u32) -> Result<(), LinkError> {
        self.control(&format!("radio rx {symbols}")).await
    }

    pub async fn stop_receive(&mut self) -> Result<(), LinkError> {
        let timeout = self.config.short_timeout_ms;
        self.command("radio sleep", timeout).await
    }

    /// Poll for a receive notification without sending anything.
    pub async fn check_receive(&mut self) -> Result<ReceiveEvent, LinkError> {
        let timeout = self.config.poll_timeout_ms;
        match self.read_line(timeout, "radio rx").await {
            Ok(line) => {
                if let Some(data) = line.strip_prefix("radio_rx") {
                    Ok(ReceiveEvent::Packet(data.trim().to_string()))
                } else if line == "radio_err" {
                    Ok(ReceiveEvent::WindowClosed)
                } else {
                    debug!("Ignoring '{}' while receiving", line);
                    Ok(ReceiveEvent::Nothing)
                }
            }
            Err(e) if e.is_timeout() => Ok(ReceiveEvent::Nothing),
            Err(e) => Err(e),
        }
    }

    /// SNR of the last received packet in dB.
    pub async fn get_snr(&mut self) -> Result<i8, LinkError> {
        let timeout = self.config.short_timeout_ms;
        let reply = self.send_command("radio get snr", timeout).await?;
        reply
            .parse::<i8>()
            .map_err(|_| LinkError::InvalidResponse(format!("snr '{reply}'")))
    }

    // ------------------------------------------------------------------
    // Channel plan
    // ------------------------------------------------------------------

    pub async fn set_channel_frequency(
        &mut self,
        channel_id: u8,
        frequency_hz: u32,
    ) -> Result<(), LinkError> {
        self.control(&format!("mac set ch freq {channel_id} {frequency_hz}"))
            .await
    }

    pub async fn set_channel_data_rate_range(
        &mut self,
        channel_id: u8,
        min_dr: u8,
        max_dr: u8,
    ) -> Result<(), LinkError> {
        self.control(&format!("mac set ch drrange {channel_id} {min_dr} {max_dr}"))
            .await
    }

    pub async fn set_channel_status(&mut self, channel_id: u8, enabled: bool) -> Result<(), LinkError> {
        let state = if enabled { "on" } else { "off" };
        self.control(&format!("mac set ch status {channel_id} {state}"))
            .await
    }

    /// Persist the MAC configuration to module EEPROM.
    pub async fn save_configuration(&mut self) -> Result<(), LinkError> {
        self.control("mac save").await
    }

    /// Read back status and frequency of a channel; never fails.
    pub async fn verify_channel(&mut self, channel_id: u8) -> ChannelReport {
        let status = self
            .query(&format!("mac get ch status {channel_id}"))
            .await
            .map_err(|e| debug!("ch status {} unreadable: {}", channel_id, e))
            .ok();
        let frequency = self
            .query(&format!("mac get ch freq {channel_id}"))
            .await
            .map_err(|e| debug!("ch freq {} unreadable: {}", channel_id, e))
            .ok();

        let report = ChannelReport {
            channel_id,
            status,
            frequency,
        };
        info!(
            "Channel {}: status={} freq={}",
            channel_id,
            report.status.as_deref().unwrap_or("?"),
            report.frequency.as_deref().unwrap_or("?")
        );
        report
    }

    /// Program an EU868 channel: frequency (ids 3-7 only), DR0-DR5, enable.
    pub async fn configure_eu868_channel(
        &mut self,
        channel_id: u8,
        frequency_hz: u32,
    ) -> Result<(), LinkError> {
        if channel_id >= EU868_FIRST_CONFIGURABLE_CHANNEL {
            self.set_channel_frequency(channel_id, frequency_hz).await?;
        }
        self.set_channel_data_rate_range(channel_id, EU868_MIN_DR, EU868_MAX_DR)
            .await?;
        self.set_channel_status(channel_id, true).await
    }

    /// Disable every channel except `channel_id`.
    ///
    /// Failures on other channels are logged and skipped; only failing to
    /// enable the target is an error.
    pub async fn enable_only_channel(&mut self, channel_id: u8) -> Result<(), LinkError> {
        let mut target_result = Err(LinkError::InvalidResponse(format!(
            "channel {channel_id} outside EU868 plan"
        )));

        for id in 0..EU868_CHANNEL_COUNT as u8 {
            let enable = id == channel_id;
            let result = self.set_channel_status(id, enable).await;
            if enable {
                target_result = result;
            } else if let Err(e) = result {
                warn!("Could not disable channel {}: {}", id, e);
            }
        }

        target_result
    }
}
