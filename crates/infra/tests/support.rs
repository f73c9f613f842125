//! Shared helpers for `policylink-infra` integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use policylink_domain::{
    ClientConfig, FlowEndpoint, FlowService, ServiceFilter, TimeRange, TimestampRange, TrafficFlow,
    TrafficQuery,
};
use policylink_infra::PceClient;
use wiremock::{MockServer, Request, ResponseTemplate};

/// Configuration pointing at `server` with millisecond timings.
pub fn fast_config(server: &MockServer) -> ClientConfig {
    let mut config = ClientConfig::new(format!("{}/api/v2", server.uri()), 1);
    config.timeout = Duration::from_secs(5);
    config.rate_limit.capacity = 1000;
    config.rate_limit.refill_amount = 1000;
    config.rate_limit.refill_interval = Duration::from_secs(1);
    config.retry.max_retries = 3;
    config.retry.base_backoff = Duration::from_millis(20);
    config.retry.jitter_range = Duration::from_millis(10);
    config.jobs.default_wait = Duration::from_millis(10);
    config.jobs.max_polls = 10;
    config.query.async_queries = false;
    config
}

pub fn client(config: ClientConfig) -> PceClient {
    PceClient::new(config).expect("client")
}

pub fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|value| value.to_str().ok())
}

pub fn june_first() -> TrafficQuery {
    TrafficQuery::new(TimeRange::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap(),
    ))
}

/// A flow with a unique source address derived from `index`.
pub fn flow(index: usize, proto: u8, port: u16) -> TrafficFlow {
    TrafficFlow::new(
        FlowEndpoint::ip(format!("10.0.{}.{}", index / 256 % 256, index % 256)),
        FlowEndpoint::ip("172.16.0.5"),
        FlowService::new(proto, Some(port)),
        2,
        TimestampRange {
            first_detected: "2024-06-01T01:00:00Z".into(),
            last_detected: "2024-06-01T02:00:00Z".into(),
        },
    )
}

/// Traffic endpoint double: applies the posted query's service terms to
/// `flows` and truncates the answer to `cap` records.
pub fn traffic_responder(
    flows: Vec<TrafficFlow>,
    cap: usize,
) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync + 'static {
    let flows = Arc::new(flows);
    move |request: &Request| {
        let Ok(query) = serde_json::from_slice::<TrafficQuery>(&request.body) else {
            return ResponseTemplate::new(400).set_body_string("bad query");
        };
        let answer: Vec<&TrafficFlow> =
            flows.iter().filter(|flow| matches_services(&query, flow)).take(cap).collect();
        ResponseTemplate::new(200).set_body_json(answer)
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
