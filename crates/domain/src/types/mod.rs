//! Domain types and models

pub mod http;
pub mod job;
pub mod traffic;

pub use http::{Headers, Method, RequestDescriptor, ResponseDescriptor, TransportRequest};
pub use job::{Href, JobDocument, JobHandle, JobStatus};
pub use traffic::{
    Actor, ActorSet, FlowEndpoint, FlowKey, FlowService, PolicyDecision, ProtocolBucket,
    ServiceFilter, ServiceSet, TimeRange, TimestampRange, TrafficFlow, TrafficQuery, WorkloadRef,
};
