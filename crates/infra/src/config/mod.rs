//! Configuration loading
//!
//! Builds a validated [`policylink_domain::ClientConfig`] from environment
//! variables (including a `.env` file) or from a JSON/TOML config file.

pub mod loader;

// Re-export commonly used items
pub use loader::{load, load_from_env, load_from_file, probe_config_paths};
