//! Confirmed uplinks repeated at fixed settings.
//!
//! Every retryable result, with or without acknowledgement, consumes the
//! same budget of `max_retries` attempts.

use super::{Classification, TransmissionCore, TransmissionStrategy, UplinkSettings};
use crate::error::LoRaError;
use crate::modem::FrameCounters;
use crate::util::hex::describe_payload;
use async_trait::async_trait;
use log::{info, warn};

pub struct RetryStrategy {
    core: TransmissionCore,
    settings: UplinkSettings,
    max_retries: u8,
}

impl RetryStrategy {
    pub fn new(core: TransmissionCore, max_retries: u8) -> Self {
        RetryStrategy {
            core,
            settings: UplinkSettings::default(),
            max_retries: max_retries.max(1),
        }
    }

    pub fn max_retries(&self) -> u8 {
        self.max_retries
    }
}

#[async_trait]
impl TransmissionStrategy for RetryStrategy {
    fn name(&self) -> &str {
        "Retry"
    }

    async fn send_message(&mut self, port: u8, payload: &[u8]) -> Result<bool, LoRaError> {
        info!(
            "Sending message with retry strategy: {} #{}",
            describe_payload(payload),
            self.core.message_counter()
        );

        self.core.apply_settings(&self.settings).await;

        for attempt in 1..=self.max_retries {
            self.core.signal_sending();
            let code = self.core.modem().send_req_ack(port, payload, 0).await;
            let class = self
                .core
                .handle(code, self.settings.spreading_factor)
                .await?;

            match class {
                Classification::Success => return Ok(true),
                Classification::Rejected => {
                    warn!("Payload rejected, not retrying");
                    return Ok(false);
                }
                Classification::RetryableNoAck => info!(
                    "No acknowledgement on attempt {}/{}, retrying with the same configuration",
                    attempt, self.max_retries
                ),
                Classification::RetryableSoft => info!(
                    "Transient error on attempt {}/{}, retrying with the same configuration",
                    attempt, self.max_retries
                ),
                Classification::Fatal => return Err(LoRaError::LinkHalted(code)),
            }
            self.core.fetch_frame_counters().await;
        }

        warn!(
            "Unsuccessful transmission after {} attempts",
            self.max_retries
        );
        Ok(false)
    }

    async fn fetch_frame_counters(&self) -> FrameCounters {
        self.core.fetch_frame_counters().await
    }

    fn core(&self) -> &TransmissionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TransmissionCore {
        &mut self.core
    }
}
