//! # PolicyLink Domain
//!
//! Data model shared by every PolicyLink crate.
//!
//! This crate contains:
//! - Request/response descriptors handed to the transport port
//! - Async job handles and job status
//! - Traffic query descriptors and flow records with their composite identity
//! - The error taxonomy (`PceError`) and `Result` alias
//! - Client configuration structures
//!
//! ## Architecture
//! - No dependencies on other PolicyLink crates
//! - Only external dependencies allowed
//! - Pure data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
