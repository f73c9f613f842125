//! Fixed-base backoff with uniform jitter
//!
//! Every retry waits `base + uniform(0..=jitter_range)`. The delay does not
//! grow with the attempt number.

use std::time::Duration;

use rand::Rng;

/// Backoff calculator producing `base + random(0..=jitter_range)` delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitteredBackoff {
    base: Duration,
    jitter_range: Duration,
}

impl JitteredBackoff {
    /// Create a backoff with the given base delay and jitter range.
    pub const fn new(base: Duration, jitter_range: Duration) -> Self {
        Self { base, jitter_range }
    }

    /// Fixed part of every delay.
    pub const fn base(&self) -> Duration {
        self.base
    }

    /// Width of the random spread added on top of [`Self::base`].
    pub const fn jitter_range(&self) -> Duration {
        self.jitter_range
    }

    /// Largest delay this backoff can produce.
    pub fn max_delay(&self) -> Duration {
        self.base.saturating_add(self.jitter_range)
    }

    /// Draw a delay using the thread-local RNG.
    pub fn delay(&self) -> Duration {
        self.delay_with(&mut rand::thread_rng())
    }

    /// Draw a delay from the supplied RNG (millisecond resolution).
    pub fn delay_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter_ms = u64::try_from(self.jitter_range.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return self.base;
        }
        let extra = rng.gen_range(0..=jitter_ms);
        self.base.saturating_add(Duration::from_millis(extra))
    }
}
