use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SampleStatus {
    Received,
    Lost,
}

/// One resolved probe. Immutable once created; appended to history and never
/// touched again.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LatencySample {
    pub seq: u64,
    pub status: SampleStatus,
    pub latency_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    /// Monotonic observation time, milliseconds since the engine clock anchor.
    pub observed_ms: f64,
    /// Wall-clock observation time.
    pub at: DateTime<Utc>,
}

/// Aggregate probe counters plus the bounded sample history. Consumers get
/// cloned snapshots, never a view into mid-update state.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LatencyStats {
    pub last_latency_ms: Option<f64>,
    pub average_latency_ms: Option<f64>,
    /// Smoothed estimate of variation between consecutive round trips.
    pub jitter_ms: Option<f64>,
    pub total_sent: u64,
    pub total_received: u64,
    pub total_lost: u64,
    pub history: Vec<LatencySample>,
}

/// Averages over the trailing window, recomputed every aggregator tick.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct RecentAverages {
    pub packet_loss_percent: Option<f64>,
    pub average_latency_ms: Option<f64>,
    pub average_jitter_ms: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct RollingWindowSummary {
    pub at: DateTime<Utc>,
    pub mos: Option<f64>,
    pub packet_loss_percent: Option<f64>,
    pub average_latency_ms: Option<f64>,
    pub average_jitter_ms: Option<f64>,
}

/// E-model approximation mapping latency, jitter, and loss onto a 1.0-4.5
/// Mean Opinion Score. Missing inputs yield `None` rather than a default
/// score.
pub fn calculate_mos(
    latency_ms: Option<f64>,
    jitter_ms: Option<f64>,
    packet_loss_percent: Option<f64>,
) -> Option<f64> {
    let (latency, jitter, loss) = match (latency_ms, jitter_ms, packet_loss_percent) {
        (Some(latency), Some(jitter), Some(loss)) => (latency, jitter, loss),
        _ => return None,
    };

    let mut r_factor = 93.2;
    let effective_latency = latency + jitter * 2.0 + 10.0;
    if effective_latency < 160.0 {
        r_factor -= effective_latency / 40.0;
    } else {
        r_factor -= (effective_latency - 120.0) / 10.0;
    }
    r_factor -= 2.5 * loss;

    if r_factor < 0.0 {
        return Some(1.0);
    }
    if r_factor > 100.0 {
        return Some(4.5);
    }

    let mos = 1.0 + 0.035 * r_factor + 7.0e-6 * r_factor * (r_factor - 60.0) * (100.0 - r_factor);
    // The polynomial dips fractionally under 1.0 for tiny positive R, so the
    // rounded score is floored to keep the 1.0-4.5 range.
    Some(((mos * 100.0).round() / 100.0).max(1.0))
}
