//! # PolicyLink Core
//!
//! Request orchestration for policy control-plane APIs - no infrastructure
//! dependencies.
//!
//! This crate contains:
//! - The transport port (`HttpTransport`)
//! - The rate-limited, retry-on-throttle request executor
//! - The async job poller (submit, poll, fetch)
//! - The truncation-aware traffic query decomposer
//!
//! ## Architecture Principles
//! - Depends on `policylink-domain` and `policylink-common` only
//! - No HTTP client code; the network is reached through `HttpTransport`
//! - Query narrowing works on immutable values, so sub-queries run in parallel

pub mod executor;
pub mod jobs;
pub mod ports;
pub mod traffic;

pub use executor::{RequestExecutor, StatusClass};
pub use jobs::AsyncJobPoller;
pub use ports::HttpTransport;
pub use traffic::{FlowSet, TrafficDecomposer};
