//! Resilience primitives for talking to rate-limited remote services
//!
//! This module provides the **generic**, domain-free pieces the PolicyLink
//! request executor is assembled from:
//! - **Clock**: monotonic time source, swappable for deterministic tests
//! - **Jittered backoff**: `base + uniform(0..=jitter)` delay calculation
//! - **Token bucket**: continuously refilling admission gate with an async,
//!   cancellable `admit`
//!
//! Nothing in here knows about HTTP. Status classification and retry
//! decisions live in `policylink-core`.

pub mod backoff;
pub mod clock;
#[cfg(feature = "runtime")]
pub mod rate_limiter;

pub use backoff::JitteredBackoff;
pub use clock::{Clock, MockClock, SystemClock};
#[cfg(feature = "runtime")]
pub use rate_limiter::{RateLimitError, TokenBucket, TokenBucketConfig, TokenBucketConfigBuilder};
