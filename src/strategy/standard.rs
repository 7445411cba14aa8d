//! Single unconfirmed uplink at the default settings.

use super::{Classification, TransmissionCore, TransmissionStrategy, UplinkSettings};
use crate::error::LoRaError;
use crate::modem::FrameCounters;
use crate::util::hex::describe_payload;
use async_trait::async_trait;
use log::{info, warn};

pub struct StandardStrategy {
    core: TransmissionCore,
    settings: UplinkSettings,
}

impl StandardStrategy {
    pub fn new(core: TransmissionCore) -> Self {
        StandardStrategy {
            core,
            settings: UplinkSettings::default(),
        }
    }
}

#[async_trait]
impl TransmissionStrategy for StandardStrategy {
    fn name(&self) -> &str {
        "Standard"
    }

    async fn send_message(&mut self, port: u8, payload: &[u8]) -> Result<bool, LoRaError> {
        info!(
            "Sending message with standard transmission: {} #{}",
            describe_payload(payload),
            self.core.message_counter()
        );

        self.core.apply_settings(&self.settings).await;

        self.core.signal_sending();
        let code = self.core.modem().send(port, payload).await;
        let class = self
            .core
            .handle(code, self.settings.spreading_factor)
            .await?;

        if class != Classification::Success {
            warn!("Unsuccessful transmission ({})", code);
            return Ok(false);
        }
        Ok(true)
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
