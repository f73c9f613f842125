//! Shared test helpers for `policylink-core` integration tests.
//!
//! `ScriptedTransport` stands in for the network: it records every request
//! with the (tokio) instant it arrived and answers from a script or a
//! closure. `TrafficUniverse` is a synthetic traffic endpoint that applies
//! a query's service filter to a fixed flow list and truncates the answer.

#![allow(dead_code)]

pub mod traffic;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use policylink_core::{AsyncJobPoller, HttpTransport, RequestExecutor, TrafficDecomposer};
use policylink_domain::{
    ClientConfig, PceError, ResponseDescriptor, Result as DomainResult, TransportRequest,
};
use tokio::time::Instant;

pub const BASE_URL: &str = "https://pce.test/api/v2";

type Responder = dyn Fn(&TransportRequest) -> DomainResult<ResponseDescriptor> + Send + Sync;

/// One request as seen by the transport.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub request: TransportRequest,
    pub at: Instant,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn path(&self) -> &str {
        let without_base = self.request.url.strip_prefix(BASE_URL).unwrap_or(&self.request.url);
        without_base.split('?').next().unwrap_or(without_base)
    }
}

/// In-memory `HttpTransport` with request recording.
pub struct ScriptedTransport {
    responder: Box<Responder>,
    latency: Duration,
    log: Mutex<Vec<Recorded>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    /// Answer with `responses` in order; once exhausted every call fails.
    pub fn sequence(responses: Vec<ResponseDescriptor>) -> Arc<Self> {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::with_fn(move |_| {
            queue
                .lock()
                .pop_front()
                .ok_or_else(|| PceError::Transport("script exhausted".into()))
        })
    }

    pub fn with_fn(
        responder: impl Fn(&TransportRequest) -> DomainResult<ResponseDescriptor> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self::build(Box::new(responder), Duration::ZERO))
    }

    /// Like [`Self::with_fn`], but every call takes `latency` to answer.
    pub fn with_latency(
        latency: Duration,
        responder: impl Fn(&TransportRequest) -> DomainResult<ResponseDescriptor> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self::build(Box::new(responder), latency))
    }

    fn build(responder: Box<Responder>, latency: Duration) -> Self {
        Self {
            responder,
            latency,
            log: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.log.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> DomainResult<ResponseDescriptor> {
        self.log.lock().push(Recorded { request: request.clone(), at: Instant::now() });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.responder)(&request)
    }
}

pub fn response(status: u16, body: &str) -> ResponseDescriptor {
    ResponseDescriptor::new(status, Vec::new(), body.as_bytes().to_vec())
}

pub fn json_response(status: u16, value: &serde_json::Value) -> ResponseDescriptor {
    ResponseDescriptor::new(
        status,
        vec![("Content-Type".into(), "application/json".into())],
        serde_json::to_vec(value).unwrap(),
    )
}

pub fn with_header(mut response: ResponseDescriptor, name: &str, value: &str) -> ResponseDescriptor {
    response.headers.push((name.to_owned(), value.to_owned()));
    response
}

pub fn accepted(location: &str, retry_after: Option<&str>) -> ResponseDescriptor {
    let response = with_header(response(202, ""), "Location", location);
    match retry_after {
        Some(seconds) => with_header(response, "Retry-After", seconds),
        None => response,
    }
}

/// Configuration with fast timings and a generous rate limit.
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::new(BASE_URL, 1);
    config.rate_limit.capacity = 1000;
    config.rate_limit.refill_amount = 1000;
    config.rate_limit.refill_interval = Duration::from_secs(1);
    config.retry.max_retries = 3;
    config.retry.base_backoff = Duration::from_secs(1);
    config.retry.jitter_range = Duration::from_millis(500);
    config.jobs.default_wait = Duration::from_secs(10);
    config.jobs.max_polls = 5;
    config.query.truncation_threshold = 100;
    config.query.max_results = 100;
    config.query.max_concurrent_subqueries = 4;
    config.query.async_queries = false;
    config
}

pub fn executor(transport: &Arc<ScriptedTransport>, config: &ClientConfig) -> Arc<RequestExecutor> {
    let transport: Arc<dyn HttpTransport> = transport.clone();
    Arc::new(RequestExecutor::new(transport, config).unwrap())
}

pub fn poller(transport: &Arc<ScriptedTransport>, config: &ClientConfig) -> AsyncJobPoller {
    AsyncJobPoller::new(executor(transport, config), config.jobs.clone())
}

pub fn decomposer(transport: &Arc<ScriptedTransport>, config: &ClientConfig) -> TrafficDecomposer {
    let executor = executor(transport, config);
    let poller = AsyncJobPoller::new(executor.clone(), config.jobs.clone());
    TrafficDecomposer::new(executor, poller, config.query.clone(), config.org_id)
}
