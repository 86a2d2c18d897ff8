use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use common::{
    LatencySample, LatencyStats, SampleStatus, WireMessage, decode_message, encode_message,
};

use crate::channel::{ChannelError, ChannelHandle};
use crate::clock::Clock;
use crate::timer::PeriodicTimer;

pub const PROBE_INTERVAL_MS: u64 = 5000;
pub const LOSS_TIMEOUT_MS: u64 = 2000;
pub const LOSS_SWEEP_INTERVAL_MS: u64 = 250;
pub const MAX_LATENCY_HISTORY: usize = 25;
pub const JITTER_SMOOTHING: f64 = 16.0;

/// Tunables for the probe scheduler and estimator.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub interval: Duration,
    pub loss_timeout: Duration,
    pub loss_sweep_interval: Duration,
    pub history_capacity: usize,
    /// Divisor of the jitter moving estimate; larger values smooth harder.
    pub jitter_smoothing: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(PROBE_INTERVAL_MS),
            loss_timeout: Duration::from_millis(LOSS_TIMEOUT_MS),
            loss_sweep_interval: Duration::from_millis(LOSS_SWEEP_INTERVAL_MS),
            history_capacity: MAX_LATENCY_HISTORY,
            jitter_smoothing: JITTER_SMOOTHING,
        }
    }
}

type SendErrorHook = Box<dyn FnMut(&ChannelError)>;

/// Sequenced round-trip prober.
///
/// Sends timestamped probes on a fixed cadence, matches echoes back to the
/// pending set, and sweeps unanswered probes into lost samples on a faster
/// cadence so loss is detected within one sweep interval of the timeout.
/// Every resolved probe becomes exactly one sample: an echo match and the
/// loss sweep both remove the sequence from the pending set, so the two can
/// never double-report.
pub struct LatencyProbe {
    config: ProbeConfig,
    clock: Clock,
    stats: LatencyStats,
    total_latency_ms: f64,
    jitter_ms: f64,
    next_seq: u64,
    pending: HashMap<u64, Instant>,
    channel: Option<ChannelHandle>,
    send_timer: PeriodicTimer,
    sweep_timer: PeriodicTimer,
    outbox: Vec<LatencySample>,
    on_send_error: Option<SendErrorHook>,
}

impl LatencyProbe {
    pub fn new(config: ProbeConfig, clock: Clock) -> Self {
        let send_timer = PeriodicTimer::new(config.interval);
        let sweep_timer = PeriodicTimer::new(config.loss_sweep_interval);
        Self {
            config,
            clock,
            stats: LatencyStats::default(),
            total_latency_ms: 0.0,
            jitter_ms: 0.0,
            next_seq: 0,
            pending: HashMap::new(),
            channel: None,
            send_timer,
            sweep_timer,
            outbox: Vec::new(),
            on_send_error: None,
        }
    }

    pub fn with_defaults(clock: Clock) -> Self {
        Self::new(ProbeConfig::default(), clock)
    }

    /// Replaces the default send-failure log with a caller hook.
    pub fn set_send_error_hook(&mut self, hook: SendErrorHook) {
        self.on_send_error = Some(hook);
    }

    pub fn stats(&self) -> &LatencyStats {
        &self.stats
    }

    pub fn stats_snapshot(&self) -> LatencyStats {
        self.stats.clone()
    }

    pub fn is_running(&self) -> bool {
        self.send_timer.is_running()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Begins probing on `channel`: sends the first probe immediately, then
    /// repeats on the configured interval while sweeping for losses. Calling
    /// again with the channel that is already being probed is a no-op.
    pub fn start(&mut self, channel: ChannelHandle, now: Instant) {
        if let Some(active) = &self.channel {
            if Rc::ptr_eq(active, &channel) && self.send_timer.is_running() {
                return;
            }
        }

        self.stop();
        self.channel = Some(channel);
        self.reset();

        self.send_probe(now);
        self.send_timer.start_after_interval(now);
        self.sweep_timer.start_after_interval(now);
    }

    /// Cancels both timers, clears pending probes, detaches the channel.
    /// Safe to call when already stopped.
    pub fn stop(&mut self) {
        self.send_timer.cancel();
        self.sweep_timer.cancel();
        self.pending.clear();
        self.channel = None;
    }

    /// Clears stats, pending probes, and the sequence counter. Timers keep
    /// running so a live engine re-arms a fresh measurement window in place.
    pub fn reset(&mut self) {
        self.stats = LatencyStats::default();
        self.total_latency_ms = 0.0;
        self.jitter_ms = 0.0;
        self.next_seq = 0;
        self.pending.clear();
        self.outbox.clear();
    }

    /// Runs every due send and sweep tick. Call from the session poll loop.
    pub fn poll(&mut self, now: Instant) {
        while self.send_timer.fire(now) {
            self.send_probe(now);
        }
        while self.sweep_timer.fire(now) {
            self.sweep_losses(now);
        }
    }

    /// Consumes probe echoes. Returns `false` when the payload is not a
    /// well-formed probe message so the collaborator can route it elsewhere;
    /// returns `true` for any recognized echo, matched or not. An unmatched
    /// sequence (already swept as lost, or left over from a prior session)
    /// is consumed silently.
    pub fn handle_message(&mut self, payload: &str, now: Instant) -> bool {
        let Ok(WireMessage::LatencyProbe { seq, .. }) = decode_message(payload) else {
            return false;
        };
        let Some(sent_at) = self.pending.remove(&seq) else {
            return true;
        };

        // Round trip comes from the locally retained send instant, never
        // from the echoed payload fields.
        let latency_ms = now.duration_since(sent_at).as_micros() as f64 / 1000.0;
        if let Some(previous) = self.stats.last_latency_ms {
            let delta = (latency_ms - previous).abs();
            self.jitter_ms += (delta - self.jitter_ms) / self.config.jitter_smoothing;
        }

        self.total_latency_ms += latency_ms;
        self.stats.total_received += 1;
        self.stats.last_latency_ms = Some(latency_ms);
        self.stats.average_latency_ms =
            Some(self.total_latency_ms / self.stats.total_received as f64);
        self.stats.jitter_ms = Some(self.jitter_ms);

        let sample = LatencySample {
            seq,
            status: SampleStatus::Received,
            latency_ms: Some(latency_ms),
            jitter_ms: Some(self.jitter_ms),
            observed_ms: self.clock.monotonic_ms(now),
            at: self.clock.wall_at(now),
        };
        self.append_history(std::slice::from_ref(&sample));
        self.outbox.push(sample);
        true
    }

    /// Drains samples produced since the last call, oldest first.
    pub fn take_samples(&mut self) -> Vec<LatencySample> {
        std::mem::take(&mut self.outbox)
    }

    fn send_probe(&mut self, now: Instant) {
        let Some(channel) = self.channel.clone() else {
            return;
        };
        if !channel.borrow().is_open() {
            return; // skip the tick; the channel may become ready later
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let message = WireMessage::LatencyProbe {
            seq,
            t0: self.clock.monotonic_ms(now),
            sent_at: self.clock.wall_epoch_ms(now),
        };
        let payload = match encode_message(&message) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(%error, seq, "failed to encode probe");
                return;
            }
        };

        match channel.borrow_mut().send(&payload) {
            Ok(()) => {
                self.pending.insert(seq, now);
                self.stats.total_sent += 1;
            }
            Err(error) => match &mut self.on_send_error {
                Some(hook) => hook(&error),
                None => tracing::warn!(%error, seq, "failed to send latency probe"),
            },
        }
    }

    fn sweep_losses(&mut self, now: Instant) {
        let mut lost: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, sent_at)| now.duration_since(**sent_at) > self.config.loss_timeout)
            .map(|(seq, _)| *seq)
            .collect();
        if lost.is_empty() {
            return;
        }
        lost.sort_unstable();

        let mut samples = Vec::with_capacity(lost.len());
        for seq in lost {
            self.pending.remove(&seq);
            samples.push(LatencySample {
                seq,
                status: SampleStatus::Lost,
                latency_ms: None,
                jitter_ms: None,
                observed_ms: self.clock.monotonic_ms(now),
                at: self.clock.wall_at(now),
            });
        }

        // One batched history update per sweep, not one per lost probe.
        self.stats.total_lost += samples.len() as u64;
        self.append_history(&samples);
        self.outbox.extend(samples);
    }

    fn append_history(&mut self, samples: &[LatencySample]) {
        self.stats.history.extend_from_slice(samples);
        if self.stats.history.len() > self.config.history_capacity {
            let excess = self.stats.history.len() - self.config.history_capacity;
            self.stats.history.drain(..excess);
        }
    }
}
