//! PCE API client
//!
//! [`PceClient`] is the entry point most callers need: it owns one rate
//! limiter per organization, runs async jobs and traffic decomposition, and
//! offers typed CRUD helpers on top of the request executor.

pub mod client;

pub use client::PceClient;
