//! Synthetic traffic endpoint
//!
//! Holds the "true" set of flows and answers traffic queries by applying the
//! query's service include/exclude terms, then truncating to `cap` records
//! the way the real server does.

use std::sync::Arc;

use parking_lot::Mutex;
use policylink_domain::{
    FlowEndpoint, FlowService, Method, PceError, ResponseDescriptor, ServiceFilter,
    TimestampRange, TrafficFlow, TrafficQuery, TransportRequest,
};

use super::json_response;

pub struct TrafficUniverse {
    flows: Vec<TrafficFlow>,
    cap: Option<usize>,
    queries: Mutex<Vec<TrafficQuery>>,
    failing: Mutex<Option<Box<dyn Fn(&TrafficQuery) -> bool + Send + Sync>>>,
}

impl TrafficUniverse {
    pub fn new(flows: Vec<TrafficFlow>, cap: Option<usize>) -> Arc<Self> {
        Arc::new(Self { flows, cap, queries: Mutex::new(Vec::new()), failing: Mutex::new(None) })
    }

    /// Answer 503 to every query matching `predicate`.
    pub fn fail_when(&self, predicate: impl Fn(&TrafficQuery) -> bool + Send + Sync + 'static) {
        *self.failing.lock() = Some(Box::new(predicate));
    }

    /// Queries received so far, in arrival order.
    pub fn queries(&self) -> Vec<TrafficQuery> {
        self.queries.lock().clone()
    }

    pub fn answer(&self, query: &TrafficQuery) -> Vec<TrafficFlow> {
        let matching = self.flows.iter().filter(|flow| matches_services(query, flow)).cloned();
        match self.cap {
            Some(cap) => matching.take(cap).collect(),
            None => matching.collect(),
        }
    }

    /// Handle one synchronous traffic query request.
    pub fn respond(&self, request: &TransportRequest) -> Result<ResponseDescriptor, PceError> {
        if request.method != Method::Post {
            return Err(PceError::Transport(format!("unexpected {} {}", request.method, request.url)));
        }
        let body = request.body.as_deref().unwrap_or_default();
        let query: TrafficQuery = serde_json::from_slice(body)
            .map_err(|e| PceError::Transport(format!("bad query body: {e}")))?;
        self.queries.lock().push(query.clone());

        if self.failing.lock().as_ref().is_some_and(|fails| fails(&query)) {
            return Ok(json_response(503, &serde_json::json!({"error": "overloaded"})));
        }
        Ok(json_response(200, &serde_json::to_value(self.answer(&query)).unwrap()))
    }
}

fn term_matches(term: &ServiceFilter, flow: &TrafficFlow) -> bool {
    if term.proto.is_some_and(|proto| proto != flow.proto()) {
        return false;
    }
    match term.port {
        None => true,
        Some(_) => flow.port().is_some_and(|port| term.admits(flow.proto(), port)),
    }
}

fn matches_services(query: &TrafficQuery, flow: &TrafficFlow) -> bool {
    let included = query.services.include.is_empty()
        || query.services.include.iter().any(|term| term_matches(term, flow));
    included && !query.services.exclude.iter().any(|term| term_matches(term, flow))
}

/// A flow with a unique source derived from `index`.
pub fn flow(index: usize, proto: u8, port: Option<u16>) -> TrafficFlow {
    TrafficFlow::new(
        FlowEndpoint::ip(format!("10.{}.{}.{}", index / 65_536 % 256, index / 256 % 256, index % 256)),
        FlowEndpoint::ip("192.168.0.10"),
        FlowService::new(proto, port),
        1,
        TimestampRange {
            first_detected: "2024-06-01T00:00:00Z".into(),
            last_detected: "2024-06-01T12:00:00Z".into(),
        },
    )
}

/// `count` flows spread round-robin over `ports`, numbered from `first_index`.
pub fn round_robin(first_index: usize, count: usize, proto: u8, ports: &[u16]) -> Vec<TrafficFlow> {
    (0..count)
        .map(|i| flow(first_index + i, proto, Some(ports[i % ports.len()])))
        .collect()
}
