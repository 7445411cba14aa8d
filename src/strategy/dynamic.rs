//! # Dynamic Parameter Strategies
//!
//! Confirmed uplinks that escalate one radio parameter (spreading factor or
//! coding rate) each time the acknowledgement budget of the current value is
//! spent. The parameter restarts from its most efficient value for every new
//! message.
//!
//! The plain variant tries each value once; [`DynamicStrategy::with_retry`]
//! tries each value `attempts_per_value` times before escalating.

use super::{Classification, TransmissionCore, TransmissionStrategy, UplinkSettings};
use crate::config::RetryConfig;
use crate::constants::{CODING_RATES, MAX_SF, MIN_SF};
use crate::error::LoRaError;
use crate::modem::FrameCounters;
use crate::util::hex::describe_payload;
use async_trait::async_trait;
use log::{info, warn};

/// An ordered domain of values for one radio parameter.
pub trait ParameterPolicy: Send + Sync {
    /// Short name used in logs and the strategy name.
    fn name(&self) -> &'static str;

    /// Back to the first value of the domain.
    fn reset(&mut self);

    /// Advance to the next value; `false` once the domain is exhausted.
    fn adjust(&mut self) -> bool;

    fn current_value(&self) -> String;

    /// Settings for the next attempt, with this parameter applied.
    fn apply(&self, base: UplinkSettings) -> UplinkSettings;
}

/// SF9 up to SF12.
#[derive(Debug, Clone)]
pub struct SpreadingFactorPolicy {
    sf: u8,
}

impl Default for SpreadingFactorPolicy {
    fn default() -> Self {
        SpreadingFactorPolicy { sf: MIN_SF }
    }
}

impl SpreadingFactorPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParameterPolicy for SpreadingFactorPolicy {
    fn name(&self) -> &'static str {
        "SF"
    }

    fn reset(&mut self) {
        self.sf = MIN_SF;
    }

    fn adjust(&mut self) -> bool {
        if self.sf < MAX_SF {
            self.sf += 1;
            true
        } else {
            false
        }
    }

    fn current_value(&self) -> String {
        self.sf.to_string()
    }

    fn apply(&self, base: UplinkSettings) -> UplinkSettings {
        UplinkSettings {
            spreading_factor: self.sf,
            ..base
        }
    }
}

/// 4/5 up to 4/8.
#[derive(Debug, Clone, Default)]
pub struct CodingRatePolicy {
    index: usize,
}

impl CodingRatePolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParameterPolicy for CodingRatePolicy {
    fn name(&self) -> &'static str {
        "CR"
    }

    fn reset(&mut self) {
        self.index = 0;
    }

    fn adjust(&mut self) -> bool {
        if self.index + 1 < CODING_RATES.len() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn current_value(&self) -> String {
        CODING_RATES[self.index].to_string()
    }

    fn apply(&self, base: UplinkSettings) -> UplinkSettings {
        UplinkSettings {
            coding_rate: CODING_RATES[self.index],
            ..base
        }
    }
}

pub struct DynamicStrategy {
    core: TransmissionCore,
    policy: Box<dyn ParameterPolicy>,
    attempts_per_value: u8,
    soft_retry_limit: u32,
    name: String,
}

impl DynamicStrategy {
    /// One attempt per parameter value.
    pub fn new(core: TransmissionCore, policy: Box<dyn ParameterPolicy>, retry: &RetryConfig) -> Self {
        let name = format!("Dynamic {}", policy.name());
        DynamicStrategy {
            core,
            policy,
            attempts_per_value: 1,
            soft_retry_limit: retry.soft_retry_limit,
            name,
        }
    }

    /// `retry.attempts_per_value` attempts per parameter value.
    pub fn with_retry(
        core: TransmissionCore,
        policy: Box<dyn ParameterPolicy>,
        retry: &RetryConfig,
    ) -> Self {
        let name = format!("Dynamic Retry {}", policy.name());
        DynamicStrategy {
            core,
            policy,
            attempts_per_value: retry.attempts_per_value.max(1),
            soft_retry_limit: retry.soft_retry_limit,
            name,
        }
    }

    pub fn attempts_per_value(&self) -> u8 {
        self.attempts_per_value
    }

    pub fn current_value(&self) -> String {
        self.policy.current_value()
    }
}

#[async_trait]
impl TransmissionStrategy for DynamicStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_message(&mut self, port: u8, payload: &[u8]) -> Result<bool, LoRaError> {
        info!(
            "Sending message with {} strategy: {} #{}",
            self.name,
            describe_payload(payload),
            self.core.message_counter()
        );

        self.policy.reset();
        let mut soft_errors = 0u32;

        loop {
            let settings = self.policy.apply(UplinkSettings::default());
            self.core.apply_settings(&settings).await;

            let mut no_acks = 0u8;
            while no_acks < self.attempts_per_value {
                self.core.signal_sending();
                let code = self.core.modem().send_req_ack(port, payload, 0).await;
                let class = self.core.handle(code, settings.spreading_factor).await?;

                match class {
                    Classification::Success => return Ok(true),
                    Classification::Rejected => {
                        warn!("Payload rejected, not retrying");
                        return Ok(false);
                    }
                    Classification::RetryableNoAck => {
                        no_acks += 1;
                        info!(
                            "No acknowledgement at {} {} ({}/{})",
                            self.policy.name(),
                            self.policy.current_value(),
                            no_acks,
                            self.attempts_per_value
                        );
                    }
                    Classification::RetryableSoft => {
                        soft_errors += 1;
                        if soft_errors >= self.soft_retry_limit {
                            warn!(
                                "Giving up after {} transient errors in one message",
                                soft_errors
                            );
                            return Ok(false);
                        }
                        info!(
                            "Transient error, retrying at {} {}",
                            self.policy.name(),
                            self.policy.current_value()
                        );
                    }
                    Classification::Fatal => return Err(LoRaError::LinkHalted(code)),
                }
                self.core.fetch_frame_counters().await;
            }

            if !self.policy.adjust() {
                warn!(
                    "Unsuccessful transmission, all {} values tried",
                    self.policy.name()
                );
                return Ok(false);
            }
            info!(
                "Retrying with {} adjusted to {}",
                self.policy.name(),
                self.policy.current_value()
            );
        }
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
