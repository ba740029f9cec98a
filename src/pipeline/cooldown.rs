// src/pipeline/cooldown.rs

//! Minimum spacing between job runs.

use chrono::{DateTime, Duration, Utc};

/// Remembers when a job last started. Owned by whoever schedules runs.
#[derive(Debug, Clone)]
pub struct Cooldown {
    interval: Duration,
    last_run: Option<DateTime<Utc>>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
        }
    }

    pub fn from_minutes(minutes: i64) -> Self {
        Self::new(Duration::minutes(minutes))
    }

    /// Time left before another run may start, if any.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let next = self.last_run? + self.interval;
        (next > now).then(|| next - now)
    }

    /// Record a run starting at `now` unless still cooling down.
    pub fn try_begin(&mut self, now: DateTime<Utc>) -> bool {
        if self.remaining(now).is_some() {
            return false;
        }
        self.last_run = Some(now);
        true
    }
}
