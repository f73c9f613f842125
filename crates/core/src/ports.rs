//! Port interfaces for the network boundary

use async_trait::async_trait;
use policylink_domain::{ResponseDescriptor, Result, TransportRequest};

/// The only point where the client touches the network.
///
/// Implementations send exactly one HTTP exchange and report whatever status
/// came back; retries, throttling and status classification happen above
/// this port. Failures before a status line is received (DNS, connect,
/// timeout) are reported as `PceError::Transport`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform one HTTP request
    async fn send(&self, request: TransportRequest) -> Result<ResponseDescriptor>;
}
