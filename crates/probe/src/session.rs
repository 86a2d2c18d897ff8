use std::path::PathBuf;
use std::time::{Duration, Instant};

use common::{LatencySample, LatencyStats, RecentAverages, RollingWindowSummary};
use uuid::Uuid;

use crate::aggregator::{AggregatorConfig, QualityAggregator};
use crate::channel::ChannelHandle;
use crate::clock::Clock;
use crate::export;
use crate::probe::{LatencyProbe, ProbeConfig};

pub const AUTO_STOP_AFTER: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Manual,
    Timeout,
    Error,
    Auto,
    Reload,
}

#[derive(Debug, Clone, Default)]
pub struct DisconnectOptions {
    pub message: Option<String>,
    pub suppress_message: bool,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub probe: ProbeConfig,
    pub aggregator: AggregatorConfig,
    /// Hard cap on a session's lifetime; hitting it forces a disconnect.
    pub auto_stop_after: Duration,
    pub export_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            probe: ProbeConfig::default(),
            aggregator: AggregatorConfig::default(),
            auto_stop_after: AUTO_STOP_AFTER,
            export_dir: PathBuf::from("exports"),
        }
    }
}

type CancelHook = Box<dyn FnOnce()>;

/// Owns one measurement session end to end: the channel handle, the probe
/// engine, the aggregator, and the teardown path. A fresh session gets a
/// fresh id; nothing is shared across sessions.
pub struct SessionController {
    config: SessionConfig,
    clock: Clock,
    probe: LatencyProbe,
    aggregator: QualityAggregator,
    state: SessionState,
    session_id: Option<Uuid>,
    channel: Option<ChannelHandle>,
    disconnect_reason: Option<DisconnectReason>,
    disconnecting: bool,
    stats_poll_cancel: Option<CancelHook>,
    auto_stop_at: Option<Instant>,
    collection_enabled: bool,
    collection_started_at: Option<Instant>,
    recorded: Vec<LatencySample>,
    last_totals: Option<(u64, u64, u64)>,
    status_message: Option<String>,
    error_message: Option<String>,
}

impl SessionController {
    pub fn new(config: SessionConfig, clock: Clock) -> Self {
        let probe = LatencyProbe::new(config.probe.clone(), clock);
        let aggregator = QualityAggregator::new(config.aggregator.clone(), clock);
        Self {
            config,
            clock,
            probe,
            aggregator,
            state: SessionState::Idle,
            session_id: None,
            channel: None,
            disconnect_reason: None,
            disconnecting: false,
            stats_poll_cancel: None,
            auto_stop_at: None,
            collection_enabled: false,
            collection_started_at: None,
            recorded: Vec::new(),
            last_totals: None,
            status_message: None,
            error_message: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.disconnect_reason
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn collection_enabled(&self) -> bool {
        self.collection_enabled
    }

    pub fn stats(&self) -> &LatencyStats {
        self.probe.stats()
    }

    pub fn recent_averages(&self) -> RecentAverages {
        self.aggregator.recent_averages()
    }

    pub fn mos(&self) -> Option<f64> {
        self.aggregator.mos()
    }

    pub fn summary_history(&self) -> Vec<RollingWindowSummary> {
        self.aggregator.summary_history()
    }

    /// Registers the cancel handle of an external transport-stats poller;
    /// invoked once during teardown.
    pub fn set_stats_poll_cancel(&mut self, cancel: CancelHook) {
        self.stats_poll_cancel = Some(cancel);
    }

    pub fn set_collection_mode(&mut self, enabled: bool) {
        self.collection_enabled = enabled;
        if !enabled {
            self.recorded.clear();
        }
    }

    /// Clears the probe's counters and history without touching the session.
    pub fn reset_stats(&mut self) {
        self.probe.reset();
        self.last_totals = None;
    }

    /// Binds a fresh session to `channel`. An already-active session is torn
    /// down first (reload semantics), then the new one starts connecting.
    pub fn connect(&mut self, channel: ChannelHandle, now: Instant) {
        if matches!(
            self.state,
            SessionState::Connecting | SessionState::Connected
        ) {
            self.disconnect(
                DisconnectReason::Reload,
                DisconnectOptions {
                    suppress_message: true,
                    ..DisconnectOptions::default()
                },
                now,
            );
        }

        let session_id = Uuid::new_v4();
        self.session_id = Some(session_id);
        self.channel = Some(channel);
        self.state = SessionState::Connecting;
        self.disconnect_reason = None;
        self.status_message = None;
        tracing::info!(%session_id, "session connecting");
    }

    /// The collaborator reports the channel ready: probing begins and the
    /// auto-stop clock starts.
    pub fn on_channel_open(&mut self, now: Instant) {
        if self.state != SessionState::Connecting {
            return;
        }
        let Some(channel) = self.channel.clone() else {
            return;
        };
        self.state = SessionState::Connected;
        self.collection_started_at = Some(now);
        self.auto_stop_at = Some(now + self.config.auto_stop_after);
        self.probe.start(channel, now);
        self.drain_samples(now);
    }

    /// Routes an inbound payload to the estimator. Returns whether the
    /// payload was consumed as probe traffic.
    pub fn handle_message(&mut self, payload: &str, now: Instant) -> bool {
        let consumed = self.probe.handle_message(payload, now);
        if consumed {
            self.drain_samples(now);
        }
        consumed
    }

    /// Drives the whole pipeline: probe ticks, sample hand-off, aggregation,
    /// and the auto-stop cap.
    pub fn poll(&mut self, now: Instant) {
        if self.state != SessionState::Connected {
            return;
        }
        self.probe.poll(now);
        self.drain_samples(now);
        self.aggregator.poll(now);

        if matches!(self.auto_stop_at, Some(deadline) if now >= deadline) {
            self.disconnect(DisconnectReason::Auto, DisconnectOptions::default(), now);
        }
    }

    /// Sole teardown path. Re-entrant and repeated calls are no-ops; every
    /// step is best-effort and teardown always runs to completion.
    pub fn disconnect(
        &mut self,
        reason: DisconnectReason,
        options: DisconnectOptions,
        now: Instant,
    ) {
        if self.disconnecting
            || matches!(self.state, SessionState::Idle | SessionState::Disconnected)
        {
            return;
        }
        self.disconnecting = true;
        self.disconnect_reason = Some(reason);
        self.state = SessionState::Disconnecting;
        tracing::info!(?reason, "disconnecting session");

        self.drain_samples(now);
        self.probe.stop();

        if let Some(cancel) = self.stats_poll_cancel.take() {
            cancel();
        }
        self.auto_stop_at = None;

        if let Some(channel) = self.channel.take() {
            if let Err(error) = channel.borrow_mut().close() {
                tracing::warn!(%error, "failed to close channel");
            }
        }

        self.session_id = None;
        self.state = SessionState::Disconnected;

        if !options.suppress_message {
            match reason {
                DisconnectReason::Manual => {
                    self.status_message = Some("Collection stopped manually".to_string());
                }
                DisconnectReason::Timeout => {
                    let started = self.collection_started_at.unwrap_or(now);
                    let minutes = now
                        .saturating_duration_since(started)
                        .as_secs()
                        .div_ceil(60)
                        .max(1);
                    let plural = if minutes == 1 { "" } else { "s" };
                    self.status_message =
                        Some(format!("Collection stopped after {minutes} minute{plural}"));
                }
                DisconnectReason::Auto => {
                    self.status_message = Some("Collection stopped after two hours.".to_string());
                }
                DisconnectReason::Error | DisconnectReason::Reload => {}
            }
        }

        if reason == DisconnectReason::Error {
            if let Some(message) = options.message {
                self.error_message = Some(message);
            }
        } else {
            self.error_message = None;
        }

        let mut saved_csv = None;
        if self.collection_enabled && !self.recorded.is_empty() {
            match export::write_latency_csv(
                &self.config.export_dir,
                &self.recorded,
                self.clock.wall_at(now),
            ) {
                Ok(name) => saved_csv = Some(name),
                Err(error) => tracing::warn!(%error, "failed to write latency export"),
            }
            self.recorded.clear();
        }

        self.aggregator.reset(false);
        self.last_totals = None;
        self.collection_started_at = None;
        self.disconnecting = false;

        if let Some(name) = saved_csv {
            if !options.suppress_message {
                let prefix = self
                    .status_message
                    .as_deref()
                    .map(|message| format!("{message} "))
                    .unwrap_or_default();
                self.status_message = Some(format!("{prefix}Saved latency probe data to {name}"));
            }
        }
    }

    fn drain_samples(&mut self, now: Instant) {
        let samples = self.probe.take_samples();
        if !samples.is_empty() {
            if self.collection_enabled {
                self.recorded.extend(samples.iter().cloned());
            }
            self.aggregator.ingest_samples(&samples);
        }

        let stats = self.probe.stats();
        let totals = (stats.total_sent, stats.total_received, stats.total_lost);
        if self.last_totals != Some(totals) {
            self.last_totals = Some(totals);
            let snapshot = stats.clone();
            self.aggregator.update_stats(&snapshot, now);
        }
    }
}
