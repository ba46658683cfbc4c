//! Delays between lessons, so the request cadence looks like a person
//! working through a course.

use std::time::Duration;

use rand::Rng;

pub const DEFAULT_MIN_DELAY_SECS: u64 = 110;
pub const DEFAULT_MAX_DELAY_SECS: u64 = 300;

pub trait Pacing: Send + Sync {
    /// Wait to apply after a processed lesson.
    fn next_delay(&self) -> Duration;
}

/// Uniformly random whole seconds in `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct RandomPacing {
    min_secs: u64,
    max_secs: u64,
}

impl RandomPacing {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs: min_secs.min(max_secs),
            max_secs: min_secs.max(max_secs),
        }
    }
}

impl Default for RandomPacing {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DELAY_SECS, DEFAULT_MAX_DELAY_SECS)
    }
}

impl Pacing for RandomPacing {
    fn next_delay(&self) -> Duration {
        let secs = rand::thread_rng().gen_range(self.min_secs..=self.max_secs);
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

impl Pacing for NoPacing {
    fn next_delay(&self) -> Duration {
        Duration::ZERO
    }
}
