use std::time::Duration;

use async_trait::async_trait;
use policylink_core::HttpTransport;
use policylink_domain::constants::DEFAULT_TIMEOUT_SECS;
use policylink_domain::{
    ClientConfig, Headers, Method, PceError, ResponseDescriptor, Result, TransportRequest,
};
use reqwest::header::HeaderMap;
use reqwest::Client as ReqwestClient;
use tracing::debug;

use crate::errors::InfraError;

/// `reqwest`-backed [`HttpTransport`].
///
/// Sends exactly one HTTP exchange per call. Retries, pacing and status
/// classification belong to the request executor; every status line that
/// arrives, including 4xx and 5xx, is returned as a response.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: ReqwestClient,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Client using the timeout and user agent from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = Self::builder().timeout(config.timeout);
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        builder.build()
    }
}

#[async_trait]
impl HttpTransport for HttpClient {
    async fn send(&self, request: TransportRequest) -> Result<ResponseDescriptor> {
        let TransportRequest { method, url, headers, body } = request;

        let mut builder = self.client.request(reqwest_method(method), url.as_str());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        debug!(%method, %url, "sending HTTP request");
        let response = builder.send().await.map_err(into_domain)?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.bytes().await.map_err(into_domain)?.to_vec();
        debug!(%method, %url, status, bytes = body.len(), "received HTTP response");

        Ok(ResponseDescriptor::new(status, headers, body))
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Option<HeaderMap>,
    accept_invalid_certs: bool,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: None,
            default_headers: None,
            accept_invalid_certs: false,
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// Accept self-signed PCE certificates. Lab use only.
    pub fn danger_accept_invalid_certs(mut self, enabled: bool) -> Self {
        self.accept_invalid_certs = enabled;
        self
    }

    pub fn build(self) -> Result<HttpClient> {
        if self.timeout.is_zero() {
            return Err(PceError::Config("HTTP timeout must be greater than 0".into()));
        }

        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        if self.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(into_domain)?;
        Ok(HttpClient { client })
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Response headers in wire order. Values that are not visible ASCII are
/// skipped; none of the protocol headers the client reads can carry them.
fn collect_headers(map: &HeaderMap) -> Headers {
    map.iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
        })
        .collect()
}

fn into_domain(err: reqwest::Error) -> PceError {
    InfraError::from(err).into()
}
