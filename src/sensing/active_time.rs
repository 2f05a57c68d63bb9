use std::time::Duration;
use tokio::time::Instant;

/// Foreground reading time, credited tick by tick.
///
/// Each tick credits the real time elapsed since `last_active_at`, unless the
/// gap is long enough to mean the host slept or was backgrounded.
#[derive(Debug, Clone)]
pub struct ActiveTimeAccumulator {
    last_active_at: Instant,
    total_active_ms: u64,
    max_gap: Duration,
}

impl ActiveTimeAccumulator {
    pub fn new(now: Instant, max_gap: Duration) -> Self {
        Self {
            last_active_at: now,
            total_active_ms: 0,
            max_gap,
        }
    }

    /// Returns the milliseconds credited by this tick. Hidden ticks are
    /// ignored entirely and leave `last_active_at` alone.
    pub fn tick(&mut self, now: Instant, visible: bool) -> u64 {
        if !visible {
            return 0;
        }

        let delta = now.saturating_duration_since(self.last_active_at);
        self.last_active_at = now;

        if delta >= self.max_gap {
            return 0;
        }

        let credited = delta.as_millis() as u64;
        self.total_active_ms = self.total_active_ms.saturating_add(credited);
        credited
    }

    /// Pointer, keyboard and touch input.
    pub fn touch(&mut self, now: Instant) {
        self.last_active_at = now;
    }

    pub fn on_visibility_change(&mut self, visible: bool, now: Instant) {
        if visible {
            self.last_active_at = now;
        }
    }

    pub fn total_active_ms(&self) -> u64 {
        self.total_active_ms
    }

    pub fn active_seconds(&self) -> u64 {
        self.total_active_ms / 1000
    }
}
