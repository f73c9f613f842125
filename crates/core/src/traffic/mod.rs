//! Traffic queries with truncation-aware decomposition

pub mod decomposer;
pub mod merge;
pub mod partition;

pub use decomposer::TrafficDecomposer;
pub use merge::FlowSet;
pub use partition::{Branch, BranchKind};
