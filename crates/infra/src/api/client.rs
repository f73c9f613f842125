//! PCE API client facade
//!
//! Wires the reqwest transport, the request executor, the async job poller
//! and the traffic decomposer together behind one handle, and adds the typed
//! CRUD helpers callers use for everyday resource work.

use std::sync::Arc;

use policylink_core::{AsyncJobPoller, HttpTransport, RequestExecutor, TrafficDecomposer};
use policylink_domain::constants::HEADER_TOTAL_COUNT;
use policylink_domain::{
    ClientConfig, Method, PceError, RequestDescriptor, ResponseDescriptor, Result, TrafficFlow,
    TrafficQuery,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::http::HttpClient;

/// Client for one PCE organization.
///
/// Every request made through the same client shares one rate limiter.
/// [`PceClient::shutdown`] cancels all in-flight work, including backoff and
/// poll waits; a shut-down client fails every further call with
/// `PceError::Cancelled`.
#[derive(Debug)]
pub struct PceClient {
    config: ClientConfig,
    executor: Arc<RequestExecutor>,
    poller: AsyncJobPoller,
    traffic: TrafficDecomposer,
    shutdown: CancellationToken,
}

impl PceClient {
    /// Create a client that talks HTTP through `reqwest`.
    ///
    /// # Errors
    /// Returns `PceError::Config` if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpClient::from_config(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client from [`crate::config::load`].
    ///
    /// # Errors
    /// Returns `PceError::Config` if no valid configuration can be loaded.
    pub fn from_env() -> Result<Self> {
        Self::new(crate::config::load()?)
    }

    /// Create a client over any transport implementation.
    ///
    /// # Errors
    /// Returns `PceError::Config` if the configuration is invalid.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        config.validate()?;

        let executor = Arc::new(RequestExecutor::new(transport, &config)?);
        let poller = AsyncJobPoller::new(Arc::clone(&executor), config.jobs.clone());
        let traffic = TrafficDecomposer::new(
            Arc::clone(&executor),
            poller.clone(),
            config.query.clone(),
            config.org_id,
        );

        info!(base_url = %config.base_url, org_id = config.org_id, "PCE client ready");
        Ok(Self { config, executor, poller, traffic, shutdown: CancellationToken::new() })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    pub fn poller(&self) -> &AsyncJobPoller {
        &self.poller
    }

    pub fn traffic(&self) -> &TrafficDecomposer {
        &self.traffic
    }

    /// Cancel all in-flight and future calls on this client.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Prefix an API path with this client's organization.
    ///
    /// `org_path("/sec_policy/draft/rulesets")` gives
    /// `/orgs/{org_id}/sec_policy/draft/rulesets`.
    pub fn org_path(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            format!("/orgs/{}", self.config.org_id)
        } else {
            format!("/orgs/{}/{path}", self.config.org_id)
        }
    }

    /// Execute one request with rate limiting and retry on throttling.
    ///
    /// # Errors
    /// See [`RequestExecutor::execute`].
    pub async fn execute(&self, request: RequestDescriptor) -> Result<ResponseDescriptor> {
        self.executor.execute(&request, &self.shutdown).await
    }

    /// Run a request through the async job protocol and return the result
    /// resource.
    ///
    /// # Errors
    /// See [`AsyncJobPoller::submit_async`].
    pub async fn submit_async(&self, request: RequestDescriptor) -> Result<ResponseDescriptor> {
        self.poller.submit_async(request, &self.shutdown).await
    }

    /// Run a traffic query, splitting it whenever the server truncates.
    ///
    /// # Errors
    /// See [`TrafficDecomposer::query`].
    pub async fn query_traffic(&self, query: &TrafficQuery) -> Result<Vec<TrafficFlow>> {
        self.traffic.query(query, &self.shutdown).await
    }

    /// Fetch a whole collection.
    ///
    /// Issues a plain GET first. When `X-Total-Count` reports more items than
    /// were returned, the server capped the page and the collection is
    /// fetched again through the async job protocol.
    ///
    /// # Errors
    /// Executor and job failures; `PceError::Protocol` when the body is not a
    /// JSON array of `T`.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn get_collection<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let request = query
            .iter()
            .fold(RequestDescriptor::get(path), |request, (key, value)| {
                request.with_query(*key, *value)
            });

        let response = self.execute(request.clone()).await?;
        let items: Vec<T> = decode(Method::Get, path, &response)?;

        match total_count(&response) {
            Some(total) if total > items.len() => {
                info!(returned = items.len(), total, "collection capped, fetching asynchronously");
                let resource = self.submit_async(request).await?;
                decode(Method::Get, path, &resource)
            }
            _ => {
                debug!(count = items.len(), "collection fetched synchronously");
                Ok(items)
            }
        }
    }

    /// Fetch a single resource.
    ///
    /// # Errors
    /// Executor failures; `PceError::Protocol` when the body is not a `T`.
    pub async fn get_resource<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.execute(RequestDescriptor::get(path)).await?;
        decode(Method::Get, path, &response)
    }

    /// Create a resource and return the server's representation of it.
    ///
    /// # Errors
    /// Executor failures; `PceError::Protocol` when the payload cannot be
    /// serialized or the response is not a `T`.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn create<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = RequestDescriptor::post(path).with_json(body)?;
        let response = self.execute(request).await?;
        decode(Method::Post, path, &response)
    }

    /// Replace a resource's writable fields.
    ///
    /// # Errors
    /// Executor failures; `PceError::Protocol` when the payload cannot be
    /// serialized.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn update<B>(&self, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized + Sync,
    {
        let request = RequestDescriptor::put(path).with_json(body)?;
        self.execute(request).await.map(drop)
    }

    /// Delete a resource.
    ///
    /// # Errors
    /// Executor failures.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(RequestDescriptor::delete(path)).await.map(drop)
    }
}

impl Drop for PceClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn total_count(response: &ResponseDescriptor) -> Option<usize> {
    response.header(HEADER_TOTAL_COUNT).and_then(|value| value.trim().parse().ok())
}

/// Decode a JSON body. An empty body (204) decodes as JSON `null`, so unit
/// and `Option` targets accept it.
fn decode<T: DeserializeOwned>(method: Method, path: &str, response: &ResponseDescriptor) -> Result<T> {
    let parsed = if response.body.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_value(serde_json::Value::Null)
    } else {
        response.json()
    };

    parsed.map_err(|e| {
        PceError::protocol(
            method,
            path,
            format!("failed to parse {} response body: {e}", response.status),
        )
    })
}
