use std::collections::VecDeque;
use std::time::{Duration, Instant};

use common::{
    LatencySample, LatencyStats, RecentAverages, RollingWindowSummary, SampleStatus, calculate_mos,
};

use crate::clock::Clock;
use crate::timer::PeriodicTimer;

pub const WINDOW_MS: u64 = 10_000;
pub const MAX_WINDOW_SAMPLES: usize = 1000;
pub const MAX_SUMMARY_HISTORY: usize = 1000;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Trailing span the averages are computed over.
    pub window: Duration,
    /// Cadence of the recompute tick.
    pub tick_interval: Duration,
    pub window_capacity: usize,
    pub summary_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(WINDOW_MS),
            tick_interval: Duration::from_millis(WINDOW_MS),
            window_capacity: MAX_WINDOW_SAMPLES,
            summary_capacity: MAX_SUMMARY_HISTORY,
        }
    }
}

/// Rolling-window reducer.
///
/// Keeps the trailing window of raw samples and periodically folds it into
/// packet-loss, latency, and jitter averages plus a MOS value. The window is
/// measured from the aggregator's own clock read at tick time, not from
/// sample insertion time.
pub struct QualityAggregator {
    config: AggregatorConfig,
    clock: Clock,
    tick_timer: PeriodicTimer,
    samples: VecDeque<LatencySample>,
    armed: bool,
    recent: RecentAverages,
    mos: Option<f64>,
    summaries: VecDeque<RollingWindowSummary>,
}

impl QualityAggregator {
    pub fn new(config: AggregatorConfig, clock: Clock) -> Self {
        let tick_timer = PeriodicTimer::new(config.tick_interval);
        Self {
            config,
            clock,
            tick_timer,
            samples: VecDeque::new(),
            armed: false,
            recent: RecentAverages::default(),
            mos: None,
            summaries: VecDeque::new(),
        }
    }

    pub fn with_defaults(clock: Clock) -> Self {
        Self::new(AggregatorConfig::default(), clock)
    }

    /// Records that fresh engine stats exist and arms the tick timer on
    /// first use. Ticks produce nothing until this has been called.
    pub fn update_stats(&mut self, _stats: &LatencyStats, now: Instant) {
        self.armed = true;
        if !self.tick_timer.is_running() {
            self.tick_timer.start_after_interval(now);
        }
    }

    /// Appends resolved samples to the raw window, oldest evicted first.
    pub fn ingest_samples(&mut self, samples: &[LatencySample]) {
        if samples.is_empty() {
            return;
        }
        self.samples.extend(samples.iter().cloned());
        while self.samples.len() > self.config.window_capacity {
            self.samples.pop_front();
        }
    }

    /// Runs every due aggregation tick.
    pub fn poll(&mut self, now: Instant) {
        while self.tick_timer.fire(now) {
            self.tick(now);
        }
    }

    pub fn recent_averages(&self) -> RecentAverages {
        self.recent
    }

    pub fn mos(&self) -> Option<f64> {
        self.mos
    }

    pub fn summary_history(&self) -> Vec<RollingWindowSummary> {
        self.summaries.iter().copied().collect()
    }

    /// Clears current readings and the raw window, and disarms the tick
    /// timer. The summary history survives unless `clear_history` is set,
    /// so a finished session can keep its trace on screen.
    pub fn reset(&mut self, clear_history: bool) {
        self.armed = false;
        self.samples.clear();
        self.recent = RecentAverages::default();
        self.mos = None;
        if clear_history {
            self.summaries.clear();
        }
        self.tick_timer.cancel();
    }

    fn tick(&mut self, now: Instant) {
        if !self.armed {
            return;
        }

        let cutoff = self.clock.monotonic_ms(now) - self.config.window.as_millis() as f64;
        while matches!(self.samples.front(), Some(sample) if sample.observed_ms < cutoff) {
            self.samples.pop_front();
        }

        let mut lost = 0u64;
        let mut total = 0u64;
        let mut latency_sum = 0.0;
        let mut latency_count = 0u64;
        let mut jitter_sum = 0.0;
        let mut jitter_count = 0u64;
        for sample in &self.samples {
            total += 1;
            if sample.status == SampleStatus::Lost {
                lost += 1;
            }
            if let Some(latency) = sample.latency_ms {
                latency_sum += latency;
                latency_count += 1;
            }
            if let Some(jitter) = sample.jitter_ms {
                jitter_sum += jitter;
                jitter_count += 1;
            }
        }

        self.recent = RecentAverages {
            packet_loss_percent: (total > 0).then(|| lost as f64 / total as f64 * 100.0),
            average_latency_ms: (latency_count > 0).then(|| latency_sum / latency_count as f64),
            average_jitter_ms: (jitter_count > 0).then(|| jitter_sum / jitter_count as f64),
        };
        self.mos = calculate_mos(
            self.recent.average_latency_ms,
            self.recent.average_jitter_ms,
            self.recent.packet_loss_percent,
        );

        let has_data = self.mos.is_some()
            || self.recent.packet_loss_percent.is_some()
            || self.recent.average_latency_ms.is_some()
            || self.recent.average_jitter_ms.is_some();
        if !has_data {
            return; // an empty window leaves no summary behind
        }

        self.summaries.push_back(RollingWindowSummary {
            at: self.clock.wall_at(now),
            mos: self.mos,
            packet_loss_percent: self.recent.packet_loss_percent,
            average_latency_ms: self.recent.average_latency_ms,
            average_jitter_ms: self.recent.average_jitter_ms,
        });
        while self.summaries.len() > self.config.summary_capacity {
            self.summaries.pop_front();
        }
    }
}
