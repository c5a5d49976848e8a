//! Backoff between acquisition attempts

use std::time::Duration;

/// Default growth per failed attempt
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(2);

/// Default ceiling on a single sleep
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Linear, capped backoff: `min(unit * retry_count, max)`.
///
/// Deterministic; no jitter and no limit on the number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    unit: Duration,
    max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            unit: DEFAULT_BACKOFF_UNIT,
            max: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl BackoffPolicy {
    /// Policy growing by `unit` per retry, capped at `max`
    pub fn new(unit: Duration, max: Duration) -> Self {
        Self { unit, max }
    }

    /// Sleep before the next attempt after `retry_count` failures
    pub fn delay(&self, retry_count: u32) -> Duration {
        self.unit
            .checked_mul(retry_count)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Growth per retry
    pub fn unit(&self) -> Duration {
        self.unit
    }

    /// Ceiling
    pub fn max(&self) -> Duration {
        self.max
    }
}
