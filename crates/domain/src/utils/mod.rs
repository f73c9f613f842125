//! Small shared helpers for domain types

pub mod serde;
