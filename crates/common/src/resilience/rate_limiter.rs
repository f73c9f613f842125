//! Token bucket admission control for outgoing requests
//!
//! The bucket holds up to `capacity` tokens and refills continuously at
//! `refill_amount / refill_interval`. Every outgoing request spends exactly one
//! token. [`TokenBucket::admit`] parks the calling task until a token is
//! available or the caller's cancellation token fires.
//!
//! Token count and last-refill instant share one mutex. The lock is only held
//! for the arithmetic, never across an `.await`, so callers that have been
//! admitted run their HTTP calls fully in parallel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{Clock, SystemClock};

/// Tolerance for float drift when comparing the token count against 1.0.
const TOKEN_EPSILON: f64 = 1e-9;

/// Errors produced by the rate limiter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// The bucket configuration is unusable
    #[error("invalid rate limiter configuration: {0}")]
    InvalidConfiguration(String),

    /// The caller cancelled while waiting for a token
    #[error("admission cancelled while waiting for a token")]
    Cancelled,
}

/// Configuration for token bucket rate limiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBucketConfig {
    /// Maximum number of tokens the bucket can hold (burst size)
    pub capacity: u64,
    /// Number of tokens added per `refill_interval`
    pub refill_amount: u64,
    /// Window over which `refill_amount` tokens are added
    pub refill_interval: Duration,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        // 125 requests per minute is the documented ceiling of most PCE tenants.
        Self { capacity: 125, refill_amount: 125, refill_interval: Duration::from_secs(60) }
    }
}

impl TokenBucketConfig {
    /// Create a new configuration builder
    pub fn builder() -> TokenBucketConfigBuilder {
        TokenBucketConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.capacity == 0 {
            return Err(RateLimitError::InvalidConfiguration(
                "capacity must be greater than 0".to_string(),
            ));
        }
        if self.refill_amount == 0 {
            return Err(RateLimitError::InvalidConfiguration(
                "refill_amount must be greater than 0".to_string(),
            ));
        }
        if self.refill_interval.is_zero() {
            return Err(RateLimitError::InvalidConfiguration(
                "refill_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Tokens added per second.
    fn tokens_per_sec(&self) -> f64 {
        self.refill_amount as f64 / self.refill_interval.as_secs_f64()
    }
}

/// Builder for TokenBucketConfig
#[derive(Debug)]
pub struct TokenBucketConfigBuilder {
    config: TokenBucketConfig,
}

impl Default for TokenBucketConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBucketConfigBuilder {
    pub fn new() -> Self {
        Self { config: TokenBucketConfig::default() }
    }

    pub fn capacity(mut self, capacity: u64) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn refill_amount(mut self, amount: u64) -> Self {
        self.config.refill_amount = amount;
        self
    }

    pub fn refill_interval(mut self, interval: Duration) -> Self {
        self.config.refill_interval = interval;
        self
    }

    pub fn build(self) -> Result<TokenBucketConfig, RateLimitError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter
///
/// Clones share the same underlying bucket, so one limiter can be handed to
/// every component that talks to the same remote service.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use policylink_common::resilience::TokenBucket;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = TokenBucket::new(10, 5, Duration::from_secs(1))?;
/// let cancel = CancellationToken::new();
///
/// limiter.admit(&cancel).await?;
/// # Ok(())
/// # }
/// ```
pub struct TokenBucket<C: Clock = SystemClock> {
    config: TokenBucketConfig,
    state: Arc<Mutex<BucketState>>,
    clock: Arc<C>,
}

impl<C: Clock> TokenBucket<C> {
    /// Create a new token bucket with custom clock
    pub fn with_clock(
        capacity: u64,
        refill_amount: u64,
        refill_interval: Duration,
        clock: C,
    ) -> Result<Self, RateLimitError> {
        Self::from_config_with_clock(
            TokenBucketConfig { capacity, refill_amount, refill_interval },
            clock,
        )
    }

    /// Create a new token bucket from a validated configuration
    pub fn from_config_with_clock(
        config: TokenBucketConfig,
        clock: C,
    ) -> Result<Self, RateLimitError> {
        config.validate()?;

        let state = BucketState { tokens: config.capacity as f64, last_refill: clock.now() };
        Ok(Self { config, state: Arc::new(Mutex::new(state)), clock: Arc::new(clock) })
    }

    /// Configuration this bucket was built from
    pub fn config(&self) -> &TokenBucketConfig {
        &self.config
    }

    /// Add the tokens accrued since the last refill. Caller holds the lock.
    fn refill(&self, state: &mut BucketState) {
        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        if elapsed.is_zero() {
            return;
        }

        let accrued = elapsed.as_secs_f64() * self.config.tokens_per_sec();
        state.tokens = (state.tokens + accrued).min(self.config.capacity as f64);
        state.last_refill = now;
    }

    /// Take one token, or report how long until one is available.
    fn reserve(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        self.refill(&mut state);

        if state.tokens + TOKEN_EPSILON >= 1.0 {
            state.tokens = (state.tokens - 1.0).max(0.0);
            trace!(remaining = state.tokens, "token granted");
            return None;
        }

        let deficit = 1.0 - state.tokens;
        let wait = Duration::from_secs_f64(deficit / self.config.tokens_per_sec());
        Some(wait.max(Duration::from_millis(1)))
    }

    /// Wait until a token is available, then consume it.
    ///
    /// Returns [`RateLimitError::Cancelled`] without consuming a token if
    /// `cancel` fires first (or has already fired).
    pub async fn admit(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        loop {
            if cancel.is_cancelled() {
                return Err(RateLimitError::Cancelled);
            }

            let Some(wait) = self.reserve() else {
                return Ok(());
            };

            debug!(wait_ms = wait.as_millis() as u64, "rate limiter delaying request");
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Try to acquire the specified number of tokens without waiting
    ///
    /// Returns `true` if tokens were acquired, `false` if not enough tokens
    /// are available (nothing is consumed in that case).
    pub fn try_acquire(&self, tokens: u64) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);

        let wanted = tokens as f64;
        if state.tokens + TOKEN_EPSILON < wanted {
            debug!(available = state.tokens, wanted = tokens, "rate limit: insufficient tokens");
            return false;
        }
        state.tokens = (state.tokens - wanted).max(0.0);
        true
    }

    /// Get the current number of whole tokens available
    pub fn available_tokens(&self) -> u64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        (state.tokens + TOKEN_EPSILON).floor() as u64
    }

    /// Reset the limiter to full capacity
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tokens = self.config.capacity as f64;
        state.last_refill = self.clock.now();
    }
}

impl TokenBucket<SystemClock> {
    /// Create a new token bucket with system clock
    pub fn new(
        capacity: u64,
        refill_amount: u64,
        refill_interval: Duration,
    ) -> Result<Self, RateLimitError> {
        Self::with_clock(capacity, refill_amount, refill_interval, SystemClock)
    }

    /// Create a new token bucket with system clock from a configuration
    pub fn from_config(config: TokenBucketConfig) -> Result<Self, RateLimitError> {
        Self::from_config_with_clock(config, SystemClock)
    }
}

impl<C: Clock> Clone for TokenBucket<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C: Clock> std::fmt::Debug for TokenBucket<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket").field("config", &self.config).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::super::MockClock;
    use super::*;

    #[test]
    fn test_token_bucket_basic() {
        let bucket = TokenBucket::with_clock(10, 5, Duration::from_secs(1), MockClock::new())
            .unwrap();

        assert!(bucket.try_acquire(5));
        assert_eq!(bucket.available_tokens(), 5);

        assert!(bucket.try_acquire(5));
        assert_eq!(bucket.available_tokens(), 0);

        assert!(!bucket.try_acquire(1));
    }

    #[test]
    fn test_token_bucket_refill_is_continuous() {
        let clock = MockClock::new();
        let bucket =
            TokenBucket::with_clock(10, 5, Duration::from_millis(100), clock.clone()).unwrap();

        assert!(bucket.try_acquire(10));
        assert_eq!(bucket.available_tokens(), 0);

        // Half an interval yields half the refill amount.
        clock.advance_millis(40);
        assert_eq!(bucket.available_tokens(), 2);

        clock.advance_millis(60);
        assert_eq!(bucket.available_tokens(), 5);

        clock.advance_millis(500);
        assert_eq!(bucket.available_tokens(), 10); // Capped at capacity
    }

    #[test]
    fn test_failed_acquire_consumes_nothing() {
        let bucket =
            TokenBucket::with_clock(3, 1, Duration::from_secs(1), MockClock::new()).unwrap();
        assert!(!bucket.try_acquire(4));
        assert_eq!(bucket.available_tokens(), 3);
    }

    #[test]
    fn test_reset_restores_capacity() {
        let bucket =
            TokenBucket::with_clock(4, 1, Duration::from_secs(60), MockClock::new()).unwrap();
        assert!(bucket.try_acquire(4));
        bucket.reset();
        assert_eq!(bucket.available_tokens(), 4);
    }

    #[test]
    fn test_clones_share_state() {
        let bucket =
            TokenBucket::with_clock(2, 1, Duration::from_secs(60), MockClock::new()).unwrap();
        let other = bucket.clone();
        assert!(bucket.try_acquire(2));
        assert!(!other.try_acquire(1));
    }

    #[test]
    fn test_token_bucket_config_validation() {
        assert!(TokenBucketConfig::builder().capacity(0).build().is_err());
        assert!(TokenBucketConfig::builder().refill_amount(0).build().is_err());
        assert!(TokenBucketConfig::builder().refill_interval(Duration::ZERO).build().is_err());
        assert!(TokenBucketConfig::builder().capacity(5).build().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn admit_is_immediate_within_capacity() {
        let bucket = TokenBucket::new(3, 3, Duration::from_secs(1)).unwrap();
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();

        for _ in 0..3 {
            bucket.admit(&cancel).await.unwrap();
        }

        assert_eq!(tokio::time::Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn admit_waits_for_refill_when_empty() {
        let bucket = TokenBucket::new(1, 4, Duration::from_secs(1)).unwrap();
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();

        bucket.admit(&cancel).await.unwrap();
        bucket.admit(&cancel).await.unwrap();

        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(250), "waited {waited:?}");
        assert!(waited < Duration::from_millis(300), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_admit_consumes_no_token() {
        let bucket = TokenBucket::new(1, 1, Duration::from_secs(60)).unwrap();
        let cancel = CancellationToken::new();
        bucket.admit(&cancel).await.unwrap();

        let waiter = {
            let bucket = bucket.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { bucket.admit(&cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(30)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(RateLimitError::Cancelled));

        // Half the interval has passed: the half token accrued is still there.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(bucket.available_tokens(), 1);
    }

    #[tokio::test]
    async fn admit_rejects_already_cancelled_token() {
        let bucket = TokenBucket::new(5, 5, Duration::from_secs(1)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(bucket.admit(&cancel).await, Err(RateLimitError::Cancelled));
        assert_eq!(bucket.available_tokens(), 5);
    }
}
