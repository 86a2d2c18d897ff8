use std::time::{Duration, Instant};

use chrono::Duration as ChronoDuration;
use common::{LatencySample, LatencyStats, SampleStatus};
use probe::{AggregatorConfig, Clock, QualityAggregator};

mod support;
use support::{at, test_clock};

fn received(
    clock: &Clock,
    base: Instant,
    seq: u64,
    latency: f64,
    jitter: f64,
    observed_ms: u64,
) -> LatencySample {
    LatencySample {
        seq,
        status: SampleStatus::Received,
        latency_ms: Some(latency),
        jitter_ms: Some(jitter),
        observed_ms: observed_ms as f64,
        at: clock.wall_at(at(base, observed_ms)),
    }
}

fn lost(clock: &Clock, base: Instant, seq: u64, observed_ms: u64) -> LatencySample {
    LatencySample {
        seq,
        status: SampleStatus::Lost,
        latency_ms: None,
        jitter_ms: None,
        observed_ms: observed_ms as f64,
        at: clock.wall_at(at(base, observed_ms)),
    }
}

fn armed_aggregator(config: AggregatorConfig, clock: Clock, base: Instant) -> QualityAggregator {
    let mut aggregator = QualityAggregator::new(config, clock);
    aggregator.update_stats(&LatencyStats::default(), base);
    aggregator
}

#[test]
fn tick_reduces_the_window_into_averages_and_mos() {
    let base = Instant::now();
    let clock = test_clock(base);
    let mut aggregator = armed_aggregator(AggregatorConfig::default(), clock, base);

    aggregator.ingest_samples(&[
        received(&clock, base, 0, 40.0, 0.0, 1_000),
        received(&clock, base, 1, 60.0, 2.0, 2_000),
        received(&clock, base, 2, 80.0, 4.0, 3_000),
        lost(&clock, base, 3, 2_500),
    ]);

    aggregator.poll(at(base, 10_000));

    let averages = aggregator.recent_averages();
    assert_eq!(averages.packet_loss_percent, Some(25.0));
    assert_eq!(averages.average_latency_ms, Some(60.0));
    assert_eq!(averages.average_jitter_ms, Some(2.0));
    assert_eq!(aggregator.mos(), Some(1.56));

    let summaries = aggregator.summary_history();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].mos, Some(1.56));
    assert_eq!(summaries[0].packet_loss_percent, Some(25.0));
    assert_eq!(
        summaries[0].at,
        clock.wall_at(base) + ChronoDuration::seconds(10)
    );
}

#[test]
fn no_tick_happens_before_the_first_stats_update() {
    let base = Instant::now();
    let clock = test_clock(base);
    let mut aggregator = QualityAggregator::with_defaults(clock);

    aggregator.ingest_samples(&[received(&clock, base, 0, 40.0, 0.0, 1_000)]);
    aggregator.poll(at(base, 30_000));

    assert_eq!(aggregator.recent_averages().average_latency_ms, None);
    assert!(aggregator.summary_history().is_empty());
}

#[test]
fn an_empty_window_appends_no_summary() {
    let base = Instant::now();
    let clock = test_clock(base);
    let mut aggregator = armed_aggregator(AggregatorConfig::default(), clock, base);

    aggregator.poll(at(base, 10_000));

    let averages = aggregator.recent_averages();
    assert_eq!(averages.packet_loss_percent, None);
    assert_eq!(averages.average_latency_ms, None);
    assert_eq!(averages.average_jitter_ms, None);
    assert_eq!(aggregator.mos(), None);
    assert!(aggregator.summary_history().is_empty());
}

#[test]
fn samples_age_out_of_the_trailing_window() {
    let base = Instant::now();
    let clock = test_clock(base);
    let mut aggregator = armed_aggregator(AggregatorConfig::default(), clock, base);

    aggregator.ingest_samples(&[received(&clock, base, 0, 40.0, 0.0, 500)]);
    aggregator.poll(at(base, 10_000));
    assert_eq!(aggregator.summary_history().len(), 1);
    assert_eq!(aggregator.recent_averages().average_latency_ms, Some(40.0));

    // by the second tick the sample sits outside the window, so the tick
    // computes nothing and appends nothing
    aggregator.poll(at(base, 20_000));
    assert_eq!(aggregator.recent_averages().average_latency_ms, None);
    assert_eq!(aggregator.summary_history().len(), 1);
}

#[test]
fn lost_only_window_still_produces_a_summary() {
    let base = Instant::now();
    let clock = test_clock(base);
    let mut aggregator = armed_aggregator(AggregatorConfig::default(), clock, base);

    aggregator.ingest_samples(&[lost(&clock, base, 0, 4_000), lost(&clock, base, 1, 5_000)]);
    aggregator.poll(at(base, 10_000));

    let averages = aggregator.recent_averages();
    assert_eq!(averages.packet_loss_percent, Some(100.0));
    assert_eq!(averages.average_latency_ms, None);
    assert_eq!(averages.average_jitter_ms, None);
    assert_eq!(aggregator.mos(), None);

    let summaries = aggregator.summary_history();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].packet_loss_percent, Some(100.0));
    assert_eq!(summaries[0].mos, None);
}

#[test]
fn summary_history_is_bounded() {
    let base = Instant::now();
    let clock = test_clock(base);
    let config = AggregatorConfig {
        tick_interval: Duration::from_millis(1_000),
        summary_capacity: 2,
        ..AggregatorConfig::default()
    };
    let mut aggregator = armed_aggregator(config, clock, base);

    for tick in 1..=4u64 {
        aggregator.ingest_samples(&[received(&clock, base, tick, 50.0, 1.0, tick * 1_000)]);
        aggregator.poll(at(base, tick * 1_000));
    }

    let summaries = aggregator.summary_history();
    assert_eq!(summaries.len(), 2);
    assert_eq!(
        summaries[1].at,
        clock.wall_at(base) + ChronoDuration::seconds(4)
    );
}

#[test]
fn reset_keeps_or_clears_the_summary_trace() {
    let base = Instant::now();
    let clock = test_clock(base);
    let mut aggregator = armed_aggregator(AggregatorConfig::default(), clock, base);

    aggregator.ingest_samples(&[received(&clock, base, 0, 40.0, 0.0, 9_000)]);
    aggregator.poll(at(base, 10_000));
    assert_eq!(aggregator.summary_history().len(), 1);
    assert!(aggregator.mos().is_some());

    aggregator.reset(false);
    assert_eq!(aggregator.summary_history().len(), 1);
    assert_eq!(aggregator.mos(), None);
    assert_eq!(aggregator.recent_averages().average_latency_ms, None);

    // the timer is disarmed until the next stats update
    aggregator.poll(at(base, 40_000));
    assert_eq!(aggregator.summary_history().len(), 1);

    aggregator.reset(true);
    assert!(aggregator.summary_history().is_empty());
}
