//! Generic building blocks shared across PolicyLink crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: clock abstraction and jittered backoff math
//! - `runtime`: async admission control (token bucket with cancellation)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation + runtime tiers
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod resilience;

// Re-export commonly used types for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use resilience::{Clock, JitteredBackoff, MockClock, SystemClock};
#[cfg(feature = "runtime")]
pub use resilience::{RateLimitError, TokenBucket, TokenBucketConfig, TokenBucketConfigBuilder};
