use chrono::{DateTime, Utc};
use std::time::Instant;

/// Anchors injected monotonic instants to a wall-clock base.
///
/// The engine only ever reads time as an `Instant` handed into its methods,
/// so tests can walk time deterministically; the anchor converts those
/// instants into monotonic-millisecond offsets for windowing and wall stamps
/// for display and export.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    base: Instant,
    base_wall: DateTime<Utc>,
}

impl Clock {
    pub fn new() -> Self {
        Self::fixed(Instant::now(), Utc::now())
    }

    /// Anchors at an explicit pair; tests drive time through this.
    pub fn fixed(base: Instant, base_wall: DateTime<Utc>) -> Self {
        Self { base, base_wall }
    }

    /// Milliseconds elapsed since the anchor, at microsecond resolution so
    /// whole-millisecond durations stay exact in f64.
    pub fn monotonic_ms(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.base).as_micros() as f64 / 1000.0
    }

    pub fn wall_at(&self, now: Instant) -> DateTime<Utc> {
        self.base_wall + chrono::Duration::milliseconds(self.monotonic_ms(now) as i64)
    }

    pub fn wall_epoch_ms(&self, now: Instant) -> f64 {
        self.wall_at(now).timestamp_millis() as f64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
