//! End-to-end strategy tests against the mock modem and mock raw radio.
//!
//! All waits go through a `ManualClock`, so regulatory backoff is asserted on
//! without actually sleeping.

use lora_reliable::config::{BackoffPolicy, LbtConfig, RetryConfig};
use lora_reliable::constants::EU868_FREQUENCIES;
use lora_reliable::error::LoRaError;
use lora_reliable::link::{JammingDetector, MockRadio, RadioCall};
use lora_reliable::modem::{MockModem, ModemCall, ResultCode};
use lora_reliable::strategy::{
    CodingRatePolicy, DynamicStrategy, Indicator, LbtStrategy, RetryStrategy, Rgb,
    SpreadingFactorPolicy, StandardStrategy, TransmissionCore, TransmissionStats,
    TransmissionStrategy,
};
use lora_reliable::util::clock::ManualClock;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ResultCode::*;

struct Harness {
    modem: MockModem,
    clock: ManualClock,
    colours: Arc<Mutex<Vec<Rgb>>>,
}

impl Harness {
    fn new() -> Self {
        Harness {
            modem: MockModem::new(),
            clock: ManualClock::new(),
            colours: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn core(&self) -> TransmissionCore {
        let sink = Arc::clone(&self.colours);
        let indicator: Indicator = Arc::new(move |c| sink.lock().unwrap().push(c));
        TransmissionCore::new(
            Arc::new(self.modem.clone()),
            indicator,
            Arc::new(self.clock.clone()),
            BackoffPolicy::default(),
        )
    }

    fn colours(&self) -> Vec<Rgb> {
        self.colours.lock().unwrap().clone()
    }
}

fn fast_lbt() -> LbtConfig {
    LbtConfig {
        detector: JammingDetector::trigger_and_listen(),
        ..LbtConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Standard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn standard_success_increments_counter() {
    let h = Harness::new();
    h.modem.queue_results(&[Success]);
    let mut strategy = StandardStrategy::new(h.core());
    strategy.set_message_counter(7);

    assert!(strategy.send_message(1, b"temp=21").await.unwrap());
    assert_eq!(strategy.message_counter(), 8);
    assert_eq!(strategy.stats().attempts, 1);
    assert_eq!(strategy.stats().successes, 1);
    assert_eq!(strategy.stats().attempts_at(9), Some(1));
    assert_eq!(h.modem.uplink_count(), 1);
    assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(10)]);
    assert_eq!(h.colours(), vec![Rgb::SENDING, Rgb::SUCCESS]);
}

#[tokio::test]
async fn standard_configures_default_settings() {
    let h = Harness::new();
    let mut strategy = StandardStrategy::new(h.core());
    strategy.send_message(2, b"x").await.unwrap();

    let calls = h.modem.calls();
    assert_eq!(
        &calls[..4],
        &[
            ModemCall::SetSpreadingFactor(9),
            ModemCall::SetPowerIndex(1),
            ModemCall::SetFsbChannels(0),
            ModemCall::SetCodingRate("4/5".into()),
        ]
    );
    assert_eq!(
        calls[4],
        ModemCall::Send {
            port: 2,
            payload: b"x".to_vec()
        }
    );
}

#[tokio::test]
async fn standard_failure_does_not_retry() {
    let h = Harness::new();
    h.modem.queue_results(&[Busy]);
    let mut strategy = StandardStrategy::new(h.core());

    assert!(!strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(h.modem.uplink_count(), 1);
    assert_eq!(strategy.message_counter(), 0);
    assert_eq!(strategy.stats().successes, 0);
}

#[tokio::test]
async fn message_counter_wraps() {
    let h = Harness::new();
    let mut strategy = StandardStrategy::new(h.core());
    strategy.set_message_counter(255);

    assert!(strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(strategy.message_counter(), 0);
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retry_succeeds_on_last_attempt() {
    let h = Harness::new();
    h.modem.queue_results(&[NoAcknowledgment, NoAcknowledgment, Success]);
    let mut strategy = RetryStrategy::new(h.core(), 3);

    assert!(strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(h.modem.uplink_count(), 3);
    assert_eq!(strategy.stats().attempts, 3);
    assert_eq!(strategy.stats().failures, 2);
    assert_eq!(strategy.stats().successes, 1);
    assert_eq!(strategy.message_counter(), 1);
    assert!(h
        .modem
        .calls()
        .iter()
        .any(|c| matches!(c, ModemCall::SendReqAck { retries: 0, .. })));
}

#[tokio::test]
async fn retry_gives_up_after_budget() {
    let h = Harness::new();
    h.modem.set_fallback(NoAcknowledgment);
    let mut strategy = RetryStrategy::new(h.core(), 3);

    assert!(!strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(h.modem.uplink_count(), 3);
    assert_eq!(strategy.message_counter(), 0);
}

#[tokio::test]
async fn retry_transient_codes_share_the_budget() {
    let h = Harness::new();
    h.modem.queue_results(&[Busy, Timeout, NoResponse]);
    h.modem.set_fallback(Success);
    let mut strategy = RetryStrategy::new(h.core(), 3);

    assert!(!strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(h.modem.uplink_count(), 3);
    assert_eq!(strategy.stats().successes, 0);
    assert_eq!(strategy.stats().failures, 0);
    // 10 s busy, 20 s timeout, 10 s no response
    assert_eq!(h.clock.total_slept(), Duration::from_secs(40));
}

#[tokio::test]
async fn retry_fetches_frame_counters_after_failures() {
    let h = Harness::new();
    h.modem.queue_results(&[NoAcknowledgment, Success]);
    h.modem.set_mac_param("upctr", "17");
    let mut strategy = RetryStrategy::new(h.core(), 3);

    assert!(strategy.send_message(1, b"x").await.unwrap());
    let reads = h
        .modem
        .calls()
        .iter()
        .filter(|c| matches!(c, ModemCall::GetMacParam(_)))
        .count();
    assert_eq!(reads, 2);
    assert_eq!(strategy.fetch_frame_counters().await.uplink, 17);
}

#[tokio::test]
async fn payload_too_large_is_not_retried() {
    let h = Harness::new();
    h.modem.queue_results(&[PayloadTooLarge]);
    let mut strategy = RetryStrategy::new(h.core(), 3);

    assert!(!strategy.send_message(1, &[0u8; 300]).await.unwrap());
    assert_eq!(h.modem.uplink_count(), 1);
    assert_eq!(h.colours().last(), Some(&Rgb::FATAL));
}

#[tokio::test]
async fn fatal_code_halts_the_link() {
    let h = Harness::new();
    h.modem.queue_results(&[NoAcknowledgment, NetworkFatal]);
    let mut strategy = RetryStrategy::new(h.core(), 3);

    let err = strategy.send_message(1, b"x").await.unwrap_err();
    assert!(matches!(err, LoRaError::LinkHalted(NetworkFatal)));
    assert!(err.is_fatal());
    assert_eq!(h.modem.uplink_count(), 2);
}

// ---------------------------------------------------------------------------
// Dynamic
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dynamic_sf_exhausts_domain() {
    let h = Harness::new();
    h.modem.set_fallback(NoAcknowledgment);
    let mut strategy = DynamicStrategy::new(
        h.core(),
        Box::new(SpreadingFactorPolicy::new()),
        &RetryConfig::default(),
    );

    assert!(!strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(h.modem.uplink_count(), 4);
    assert_eq!(h.modem.spreading_factors(), vec![9, 10, 11, 12]);
    assert_eq!(strategy.stats().sf_histogram, [1, 1, 1, 1]);
    assert_eq!(strategy.stats().failures, 4);
}

#[tokio::test]
async fn dynamic_sf_holds_value_on_success() {
    let h = Harness::new();
    h.modem.queue_results(&[NoAcknowledgment, NoAcknowledgment, Success]);
    let mut strategy = DynamicStrategy::new(
        h.core(),
        Box::new(SpreadingFactorPolicy::new()),
        &RetryConfig::default(),
    );

    assert!(strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(strategy.current_value(), "11");
    assert_eq!(strategy.stats().attempts_at(11), Some(1));

    // Next message starts again from SF9.
    assert!(strategy.send_message(1, b"y").await.unwrap());
    assert_eq!(h.modem.spreading_factors(), vec![9, 10, 11, 9]);
}

#[tokio::test]
async fn dynamic_soft_errors_do_not_escalate() {
    let h = Harness::new();
    h.modem.queue_results(&[Busy, Silent, Success]);
    let mut strategy = DynamicStrategy::new(
        h.core(),
        Box::new(SpreadingFactorPolicy::new()),
        &RetryConfig::default(),
    );

    assert!(strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(h.modem.spreading_factors(), vec![9]);
    assert_eq!(strategy.stats().attempts_at(9), Some(3));
}

#[tokio::test]
async fn dynamic_soft_errors_are_bounded() {
    let h = Harness::new();
    h.modem.set_fallback(Busy);
    let retry = RetryConfig {
        soft_retry_limit: 4,
        ..RetryConfig::default()
    };
    let mut strategy =
        DynamicStrategy::new(h.core(), Box::new(SpreadingFactorPolicy::new()), &retry);

    assert!(!strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(h.modem.uplink_count(), 4);
}

#[tokio::test]
async fn dynamic_retry_tries_each_value_three_times() {
    let h = Harness::new();
    h.modem.set_fallback(NoAcknowledgment);
    let mut strategy = DynamicStrategy::with_retry(
        h.core(),
        Box::new(SpreadingFactorPolicy::new()),
        &RetryConfig::default(),
    );

    assert_eq!(strategy.name(), "Dynamic Retry SF");
    assert!(!strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(h.modem.uplink_count(), 12);
    assert_eq!(strategy.stats().sf_histogram, [3, 3, 3, 3]);
}

#[tokio::test]
async fn dynamic_cr_escalates_coding_rate() {
    let h = Harness::new();
    h.modem.queue_results(&[NoAcknowledgment, NoAcknowledgment, NoAcknowledgment, Success]);
    let mut strategy = DynamicStrategy::new(
        h.core(),
        Box::new(CodingRatePolicy::new()),
        &RetryConfig::default(),
    );

    assert!(strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(h.modem.coding_rates(), vec!["4/5", "4/6", "4/7", "4/8"]);
    assert_eq!(h.modem.spreading_factors(), vec![9, 9, 9, 9]);
}

// ---------------------------------------------------------------------------
// Listen-Before-Talk
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lbt_all_channels_jammed() {
    let h = Harness::new();
    let radio = MockRadio::new();
    radio.jam_all(&EU868_FREQUENCIES);
    let mut strategy = LbtStrategy::new(h.core(), radio.clone(), fast_lbt());

    assert!(!strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(radio.probed().len(), 8);
    assert_eq!(h.modem.uplink_count(), 0);
    for channel in strategy.selector().channels() {
        assert_eq!(channel.failure_count, 1, "channel {}", channel.id);
    }

    let stats = strategy.jamming_stats();
    assert_eq!(stats.total_probes, 8);
    assert_eq!(stats.jammed_probes, 8);
    assert_eq!(stats.retry_count, 8);
    assert!(stats.last_jamming_at.is_some());
}

#[tokio::test]
async fn lbt_clear_channel_locks_and_sends() {
    let h = Harness::new();
    let radio = MockRadio::new();
    h.modem.queue_results(&[Success]);
    let mut strategy = LbtStrategy::new(h.core(), radio.clone(), fast_lbt());

    assert!(strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(
        radio.calls(),
        vec![
            RadioCall::PauseMac,
            RadioCall::DetectJamming(868_100_000),
            RadioCall::ResumeMac,
            RadioCall::ConfigureChannel(0),
            RadioCall::EnableOnlyChannel(0),
            RadioCall::SaveConfiguration,
            RadioCall::VerifyChannel(0),
        ]
    );
    assert_eq!(strategy.message_counter(), 1);
    assert_eq!(strategy.jamming_stats().current_channel, Some(0));
    // 500 ms settle, 200 ms after save, 10 s success backoff
    assert_eq!(
        h.clock.sleeps(),
        vec![
            Duration::from_millis(500),
            Duration::from_millis(200),
            Duration::from_secs(10)
        ]
    );
}

#[tokio::test]
async fn lbt_skips_jammed_channel() {
    let h = Harness::new();
    let radio = MockRadio::new();
    radio.jam(EU868_FREQUENCIES[0]);
    let mut strategy = LbtStrategy::new(h.core(), radio.clone(), fast_lbt());

    assert!(strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(radio.probed(), vec![EU868_FREQUENCIES[0], EU868_FREQUENCIES[1]]);
    assert_eq!(strategy.selector().failure_count(0), Some(1));
    assert_eq!(strategy.selector().ranked()[..2], [1, 2]);
}

#[tokio::test]
async fn lbt_retries_on_channel_with_random_gap() {
    let h = Harness::new();
    let radio = MockRadio::new();
    h.modem.queue_results(&[NoAcknowledgment, NoAcknowledgment, NoAcknowledgment, Success]);
    let mut strategy = LbtStrategy::new(h.core(), radio.clone(), fast_lbt());

    assert!(strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(h.modem.uplink_count(), 4);
    assert_eq!(strategy.selector().failure_count(0), Some(1));
    assert_eq!(strategy.jamming_stats().current_channel, Some(1));

    let gaps: Vec<Duration> = h
        .clock
        .sleeps()
        .into_iter()
        .filter(|d| *d >= Duration::from_millis(1000) && *d <= Duration::from_millis(2000))
        .collect();
    assert_eq!(gaps.len(), 2);
}

#[tokio::test]
async fn lbt_pause_failure_treats_channel_as_clear() {
    let h = Harness::new();
    let radio = MockRadio::new();
    radio.set_pause_window(None);
    let mut strategy = LbtStrategy::new(h.core(), radio.clone(), fast_lbt());

    assert!(strategy.send_message(1, b"x").await.unwrap());
    assert!(radio.probed().is_empty());
    assert_eq!(strategy.jamming_stats().total_probes, 0);
}

#[tokio::test]
async fn lbt_short_pause_window_skips_probe() {
    let h = Harness::new();
    let radio = MockRadio::new();
    radio.set_pause_window(Some(1500));
    let mut strategy = LbtStrategy::new(h.core(), radio.clone(), fast_lbt());

    assert!(strategy.send_message(1, b"x").await.unwrap());
    assert!(radio.probed().is_empty());
    assert!(radio.calls().contains(&RadioCall::ResumeMac));
}

#[tokio::test]
async fn lbt_probe_and_config_errors_count_as_channel_failures() {
    let h = Harness::new();
    let radio = MockRadio::new();
    radio.fail_probe(EU868_FREQUENCIES[0]);
    radio.refuse_channel(1);
    let mut strategy = LbtStrategy::new(h.core(), radio.clone(), fast_lbt());

    assert!(strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(strategy.selector().failure_count(0), Some(1));
    assert_eq!(strategy.selector().failure_count(1), Some(1));
    assert_eq!(strategy.jamming_stats().current_channel, Some(2));
}

#[tokio::test]
async fn lbt_save_failure_is_only_a_warning() {
    let h = Harness::new();
    let radio = MockRadio::new();
    radio.set_save_fails(true);
    let mut strategy = LbtStrategy::new(h.core(), radio.clone(), fast_lbt());

    assert!(strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(strategy.selector().failure_count(0), Some(0));
}

#[tokio::test]
async fn lbt_fatal_code_halts() {
    let h = Harness::new();
    let radio = MockRadio::new();
    h.modem.queue_results(&[NotConnected]);
    let mut strategy = LbtStrategy::new(h.core(), radio, fast_lbt());

    let err = strategy.send_message(1, b"x").await.unwrap_err();
    assert!(matches!(err, LoRaError::LinkHalted(NotConnected)));
}

#[tokio::test]
async fn lbt_jamming_stats_reset_is_idempotent() {
    let h = Harness::new();
    let radio = MockRadio::new();
    radio.jam(EU868_FREQUENCIES[0]);
    let mut strategy = LbtStrategy::new(h.core(), radio, fast_lbt());
    strategy.send_message(1, b"x").await.unwrap();
    assert!(strategy.jamming_stats().total_probes > 0);

    strategy.reset_jamming_stats();
    let first = strategy.jamming_stats().clone();
    strategy.reset_jamming_stats();
    assert_eq!(strategy.jamming_stats(), &first);
    assert_eq!(first.total_probes, 0);
    assert_eq!(first.last_jamming_at, None);
    strategy.log_jamming_summary();
}

#[tokio::test]
async fn lbt_through_shared_gate() {
    let h = Harness::new();
    let radio = MockRadio::new();
    let gate = Arc::new(tokio::sync::Mutex::new(radio.clone()));
    let mut strategy = LbtStrategy::new(h.core(), Arc::clone(&gate), fast_lbt());

    assert!(strategy.send_message(1, b"x").await.unwrap());
    assert_eq!(radio.probed(), vec![EU868_FREQUENCIES[0]]);
}

#[tokio::test]
async fn stats_reset_restores_initial_state() {
    let h = Harness::new();
    h.modem.queue_results(&[NoAcknowledgment, Success]);
    let mut strategy = RetryStrategy::new(h.core(), 3);
    strategy.send_message(1, b"x").await.unwrap();
    strategy.log_statistics();

    strategy.core_mut().reset_stats();
    assert_eq!(strategy.stats(), &TransmissionStats::default());
}

#[tokio::test]
async fn lbt_inverted_retry_delay_bounds() {
    let h = Harness::new();
    let radio = MockRadio::new();
    h.modem.queue_results(&[NoAcknowledgment, Success]);
    let config = LbtConfig {
        retry_delay_min_ms: 2000,
        retry_delay_max_ms: 1000,
        ..fast_lbt()
    };
    let mut strategy = LbtStrategy::new(h.core(), radio, config);

    assert!(strategy.send_message(1, b"x").await.unwrap());
    let gap = h.clock.sleeps()[3];
    assert!(gap >= Duration::from_millis(1000) && gap <= Duration::from_millis(2000));
}
