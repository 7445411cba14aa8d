//! Mock modem implementation for testing
//!
//! Scripted [`ResultCode`]s for uplink attempts and canned MAC parameters, with
//! every call recorded so tests can assert on the exact sequence of operations.

use super::{LoRaModem, ResultCode};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// One recorded modem operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemCall {
    Send { port: u8, payload: Vec<u8> },
    SendReqAck { port: u8, payload: Vec<u8>, retries: u8 },
    SetSpreadingFactor(u8),
    SetPowerIndex(u8),
    SetFsbChannels(u8),
    SetCodingRate(String),
    GetMacParam(String),
}

/// Mock modem; clones share state.
#[derive(Clone)]
pub struct MockModem {
    /// Result codes handed out by `send`/`send_req_ack`, in order.
    pub results: Arc<Mutex<VecDeque<ResultCode>>>,
    /// Returned once the script is exhausted.
    pub fallback: Arc<Mutex<ResultCode>>,
    /// Every call, in order.
    pub calls: Arc<Mutex<Vec<ModemCall>>>,
    /// Replies for `get_mac_param`.
    pub mac_params: Arc<Mutex<HashMap<String, String>>>,
    /// Whether setters report success.
    pub accept_settings: Arc<Mutex<bool>>,
}

impl Default for MockModem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockModem {
    pub fn new() -> Self {
        MockModem {
            results: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new(ResultCode::Success)),
            calls: Arc::new(Mutex::new(Vec::new())),
            mac_params: Arc::new(Mutex::new(HashMap::new())),
            accept_settings: Arc::new(Mutex::new(true)),
        }
    }

    /// Script the next uplink results.
    pub fn queue_results(&self, codes: &[ResultCode]) {
        self.results.lock().unwrap().extend(codes.iter().copied());
    }

    /// Result returned when the script runs dry.
    pub fn set_fallback(&self, code: ResultCode) {
        *self.fallback.lock().unwrap() = code;
    }

    pub fn set_mac_param(&self, name: &str, value: &str) {
        self.mac_params
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    pub fn set_accept_settings(&self, accept: bool) {
        *self.accept_settings.lock().unwrap() = accept;
    }

    pub fn calls(&self) -> Vec<ModemCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of `send` plus `send_req_ack` calls.
    pub fn uplink_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, ModemCall::Send { .. } | ModemCall::SendReqAck { .. }))
            .count()
    }

    /// Spreading factors set, in order.
    pub fn spreading_factors(&self) -> Vec<u8> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                ModemCall::SetSpreadingFactor(sf) => Some(*sf),
                _ => None,
            })
            .collect()
    }

    /// Coding rates set, in order.
    pub fn coding_rates(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                ModemCall::SetCodingRate(cr) => Some(cr.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ModemCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_result(&self) -> ResultCode {
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| *self.fallback.lock().unwrap())
    }

    fn setting_accepted(&self) -> bool {
        *self.accept_settings.lock().unwrap()
    }
}

#[async_trait]
impl LoRaModem for MockModem {
    async fn send(&self, port: u8, payload: &[u8]) -> ResultCode {
        self.record(ModemCall::Send {
            port,
            payload: payload.to_vec(),
        });
        self.next_result()
    }

    async fn send_req_ack(&self, port: u8, payload: &[u8], retries: u8) -> ResultCode {
        self.record(ModemCall::SendReqAck {
            port,
            payload: payload.to_vec(),
            retries,
        });
        self.next_result()
    }

    async fn set_spreading_factor(&self, sf: u8) -> bool {
        self.record(ModemCall::SetSpreadingFactor(sf));
        self.setting_accepted()
    }

    async fn set_power_index(&self, index: u8) -> bool {
        self.record(ModemCall::SetPowerIndex(index));
        self.setting_accepted()
    }

    async fn set_fsb_channels(&self, fsb: u8) -> bool {
        self.record(ModemCall::SetFsbChannels(fsb));
        self.setting_accepted()
    }

    async fn set_coding_rate(&self, cr: &str) -> bool {
        self.record(ModemCall::SetCodingRate(cr.to_string()));
        self.setting_accepted()
    }

    async fn get_mac_param(&self, name: &str) -> Option<String> {
        self.record(ModemCall::GetMacParam(name.to_string()));
        self.mac_params.lock().unwrap().get(name).cloned()
    }
}
