use lora_reliable::channel::ChannelSelector;
use lora_reliable::constants::EU868_FREQUENCIES;
use proptest::prelude::*;
use std::time::{Duration, Instant};

const AGING: Duration = Duration::from_secs(30 * 60);

#[test]
fn avoids_failed_channels() {
    let mut selector = ChannelSelector::eu868();
    let now = Instant::now();
    for _ in 0..3 {
        selector.record_failure(3, now);
    }
    selector.record_failure(0, now);

    let best = selector.select_best_channel(now).unwrap();
    assert_eq!(best.id, 1);
    assert_eq!(best.frequency_hz, EU868_FREQUENCIES[1]);
    assert_eq!(selector.ranked(), vec![1, 2, 4, 5, 6, 7, 0, 3]);
}

#[test]
fn failures_age_out() {
    let mut selector = ChannelSelector::eu868();
    let start = Instant::now();
    for channel in 0..8 {
        selector.record_failure(channel, start);
    }
    for _ in 0..4 {
        selector.record_failure(5, start);
    }
    assert_eq!(selector.failure_count(5), Some(5));

    // Exactly at the aging boundary nothing is forgotten yet.
    selector.select_best_channel(start + AGING);
    assert_eq!(selector.failure_count(5), Some(5));

    let later = start + AGING + Duration::from_secs(1);
    let best = selector.select_best_channel(later).unwrap();
    assert_eq!(best.id, 0);
    assert_eq!(best.failure_count, 0);
    assert_eq!(selector.failure_count(5), Some(0));
    assert!(selector.channel(5).unwrap().last_failure.is_none());
}

#[test]
fn recent_failure_keeps_count() {
    let mut selector = ChannelSelector::eu868();
    let start = Instant::now();
    selector.record_failure(0, start);
    selector.record_failure(0, start + AGING);

    selector.select_best_channel(start + AGING + Duration::from_secs(60));
    assert_eq!(selector.failure_count(0), Some(2));
}

#[test]
fn unknown_channel_is_ignored() {
    let mut selector = ChannelSelector::eu868();
    selector.record_failure(42, Instant::now());
    assert!(selector.summary().iter().all(|c| c.failure_count == 0));
    assert_eq!(selector.failure_count(42), None);
}

#[test]
fn reset_clears_history() {
    let mut selector = ChannelSelector::eu868();
    let now = Instant::now();
    selector.record_failure(0, now);
    selector.record_failure(6, now);

    selector.reset();
    assert_eq!(selector.ranked(), (0..8).collect::<Vec<u8>>());
    assert!(selector.channels().iter().all(|c| c.last_failure.is_none()));
}

#[test]
fn empty_plan_has_no_channel() {
    let mut selector = ChannelSelector::new(&[], AGING);
    assert!(selector.is_empty());
    assert!(selector.select_best_channel(Instant::now()).is_none());
}

#[test]
fn summary_serializes() {
    let mut selector = ChannelSelector::new(&[868_100_000, 868_300_000], AGING);
    selector.record_failure(1, Instant::now());

    let json = serde_json::to_value(selector.summary()).unwrap();
    assert_eq!(json[1]["id"], 1);
    assert_eq!(json[1]["failure_count"], 1);
    assert_eq!(json[0]["frequency_hz"], 868_100_000);
}

proptest! {
    #[test]
    fn best_channel_has_minimum_failures(failures in proptest::collection::vec(0u8..8, 0..64)) {
        let mut selector = ChannelSelector::eu868();
        let now = Instant::now();
        for id in &failures {
            selector.record_failure(*id, now);
        }

        let min = selector.channels().iter().map(|c| c.failure_count).min().unwrap();
        let best = selector.select_best_channel(now).unwrap().clone();
        prop_assert_eq!(best.failure_count, min);
        // Lowest id among the tied channels.
        let first_tied = selector
            .channels()
            .iter()
            .find(|c| c.failure_count == min)
            .unwrap()
            .id;
        prop_assert_eq!(best.id, first_tied);
    }

    #[test]
    fn ranking_is_a_permutation(failures in proptest::collection::vec(0u8..8, 0..64)) {
        let mut selector = ChannelSelector::eu868();
        let now = Instant::now();
        for id in &failures {
            selector.record_failure(*id, now);
        }

        let ranked = selector.ranked();
        let mut sorted = ranked.clone();
        sorted.sort_unstable();
        prop_assert_eq!(sorted, (0..8).collect::<Vec<u8>>());

        let counts: Vec<u8> = ranked
            .iter()
            .map(|id| selector.failure_count(*id).unwrap())
            .collect();
        prop_assert!(counts.windows(2).all(|w| w[0] <= w[1]));
    }
}
