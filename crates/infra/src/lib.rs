//! # PolicyLink Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - The `reqwest`-backed `HttpTransport`
//! - Conversions from external errors into `PceError`
//! - Configuration loading from environment variables and files
//! - Tracing subscriber setup
//! - The `PceClient` facade
//!
//! ## Architecture
//! - Implements traits defined in `policylink-core`
//! - Depends on `policylink-domain` and `policylink-core`
//! - Contains all "impure" code (network, filesystem, process environment)

pub mod api;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;

// Re-export commonly used items
pub use api::PceClient;
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
pub use observability::{init_tracing, LogFormat};
