use std::time::{Duration, Instant};

use crate::stream::CancelHandle;

/// Smallest interval used when computing throughput, in seconds.
pub const MIN_ELAPSED_SECS: f64 = 0.0001;

/// Tokens per second between `start` and `end`. Always finite and
/// non-negative, even when no time has passed.
pub fn tokens_per_second(token_count: usize, start: Instant, end: Instant) -> f64 {
    let elapsed = end.saturating_duration_since(start).as_secs_f64();
    token_count as f64 / elapsed.max(MIN_ELAPSED_SECS)
}

/// Bookkeeping for a single generation.
#[derive(Clone, Debug)]
pub struct GenerationSession {
    token_count: usize,
    started_at: Instant,
    stopped_at: Option<Instant>,
    cancel: CancelHandle,
}

impl GenerationSession {
    pub fn start(cancel: CancelHandle) -> Self {
        Self {
            token_count: 0,
            started_at: Instant::now(),
            stopped_at: None,
            cancel,
        }
    }

    pub(crate) fn record_token(&mut self) {
        self.token_count += 1;
    }

    /// Stops the clock. Only the first call has an effect.
    pub(crate) fn finish(&mut self) {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(Instant::now());
        }
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn is_running(&self) -> bool {
        self.stopped_at.is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn stopped_at(&self) -> Option<Instant> {
        self.stopped_at
    }

    pub fn elapsed(&self) -> Duration {
        self.stopped_at
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.started_at)
    }

    /// Measured against now while running, against the stop time once done.
    pub fn tokens_per_second(&self) -> f64 {
        self.tokens_per_second_at(Instant::now())
    }

    pub fn tokens_per_second_at(&self, now: Instant) -> f64 {
        let end = self.stopped_at.unwrap_or(now);
        tokens_per_second(self.token_count, self.started_at, end)
    }
}
