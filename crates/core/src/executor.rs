//! Rate-limited, retrying request executor
//!
//! Every outgoing call goes through [`RequestExecutor::execute`]:
//! admission through the shared token bucket, one transport call, then
//! status classification. Only HTTP 429 is retried here.

use std::sync::Arc;
use std::time::Duration;

use policylink_common::resilience::{JitteredBackoff, RateLimitError, TokenBucket};
use policylink_domain::constants::{
    CONTENT_TYPE_JSON, HEADER_ACCEPT, HEADER_REQUEST_ID, STATUS_TOO_MANY_REQUESTS,
};
use policylink_domain::{
    ClientConfig, Headers, PceError, RateLimitSettings, RequestDescriptor, ResponseDescriptor,
    Result, RetryPolicy, TransportRequest,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::ports::HttpTransport;

/// Longest response body excerpt carried in an error.
const ERROR_BODY_LIMIT: usize = 512;

/// How a response status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Throttled,
    Rejected,
    Unavailable,
    Unexpected,
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            STATUS_TOO_MANY_REQUESTS => Self::Throttled,
            400..=499 => Self::Rejected,
            500..=599 => Self::Unavailable,
            _ => Self::Unexpected,
        }
    }
}

/// Executes single API calls with admission control and retry-on-throttle.
///
/// Cheap to share behind an `Arc`; the token bucket is the only mutable
/// state and it is never locked across an await.
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    limiter: TokenBucket,
    backoff: JitteredBackoff,
    max_retries: u32,
    base_url: Url,
}

impl RequestExecutor {
    /// Build an executor from client configuration.
    ///
    /// # Errors
    /// Returns `PceError::Config` for an unparsable base URL or invalid rate
    /// limit settings.
    pub fn new(transport: Arc<dyn HttpTransport>, config: &ClientConfig) -> Result<Self> {
        let limiter = token_bucket(&config.rate_limit)?;
        Self::from_parts(transport, &config.base_url, limiter, &config.retry)
    }

    /// Build an executor around an existing limiter, e.g. one shared with
    /// another executor targeting the same server.
    ///
    /// # Errors
    /// Returns `PceError::Config` when `base_url` is not an absolute URL.
    pub fn from_parts(
        transport: Arc<dyn HttpTransport>,
        base_url: &str,
        limiter: TokenBucket,
        retry: &RetryPolicy,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PceError::Config(format!("invalid base_url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PceError::Config(format!("base_url {base_url} cannot be a base")));
        }

        Ok(Self {
            transport,
            limiter,
            backoff: JitteredBackoff::new(retry.base_backoff, retry.jitter_range),
            max_retries: retry.max_retries,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn limiter(&self) -> &TokenBucket {
        &self.limiter
    }

    /// Execute one logical call.
    ///
    /// 2xx is returned as-is. 429 is retried after
    /// `base_backoff + uniform(0..=jitter_range)` until `max_retries` retries
    /// have been spent. Every other status fails immediately. All waits and
    /// the transport call itself abort when `cancel` fires.
    ///
    /// # Errors
    /// `Cancelled`, `RetriesExhausted`, `RemoteRejected`, `RemoteUnavailable`,
    /// `Protocol` or `Transport`.
    #[instrument(skip(self, request, cancel), fields(method = %request.method(), path = %request.path()))]
    pub async fn execute(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ResponseDescriptor> {
        let url = self.resolve_url(request)?;
        let request_id = request
            .header(HEADER_REQUEST_ID)
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);
        let headers = outgoing_headers(request, &request_id);

        let mut retries = 0u32;
        loop {
            self.limiter.admit(cancel).await.map_err(admission_error)?;

            let outgoing = TransportRequest {
                method: request.method(),
                url: url.to_string(),
                headers: headers.clone(),
                body: request.body().map(<[u8]>::to_vec),
            };
            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(PceError::Cancelled),
                sent = self.transport.send(outgoing) => sent?,
            };

            debug!(
                attempt = retries + 1,
                status = response.status,
                request_id = %request_id,
                "response received"
            );

            match StatusClass::of(response.status) {
                StatusClass::Success => return Ok(response),
                StatusClass::Throttled if retries >= self.max_retries => {
                    warn!(attempts = retries + 1, request_id = %request_id, "throttling persisted, giving up");
                    return Err(PceError::RetriesExhausted {
                        method: request.method(),
                        path: request.path().to_owned(),
                        attempts: retries + 1,
                        status: format!("{} Too Many Requests", response.status),
                    });
                }
                StatusClass::Throttled => {
                    let delay = self.backoff.delay();
                    warn!(
                        retry = retries + 1,
                        max_retries = self.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "throttled, backing off"
                    );
                    sleep_or_cancel(delay, cancel).await?;
                    retries += 1;
                }
                _ => return Err(classify_failure(request, &response)),
            }
        }
    }

    /// Resolve a request path against the base URL and append its query.
    ///
    /// Absolute `http(s)` URLs are used verbatim. Paths that already carry
    /// the base URL's path prefix (e.g. `/api/v2/orgs/1/...`) are not
    /// prefixed twice.
    ///
    /// # Errors
    /// Returns `PceError::Protocol` when an absolute URL does not parse.
    pub fn resolve_url(&self, request: &RequestDescriptor) -> Result<Url> {
        let target = request.path();
        let mut url = if target.starts_with("http://") || target.starts_with("https://") {
            Url::parse(target).map_err(|e| {
                PceError::protocol(request.method(), target, format!("invalid URL: {e}"))
            })?
        } else {
            let (path, inline_query) = match target.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (target, None),
            };
            let base_path = self.base_url.path().trim_end_matches('/');
            let already_prefixed = !base_path.is_empty()
                && (path == base_path || path.starts_with(&format!("{base_path}/")));

            let mut url = self.base_url.clone();
            if already_prefixed {
                url.set_path(path);
            } else {
                url.set_path(&format!("{base_path}/{}", path.trim_start_matches('/')));
            }
            url.set_query(inline_query);
            url
        };

        if !request.query().is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in request.query() {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url.as_str())
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

/// Build the shared admission gate from configuration.
///
/// # Errors
/// Returns `PceError::Config` for zero capacity, refill amount or interval.
pub fn token_bucket(settings: &RateLimitSettings) -> Result<TokenBucket> {
    TokenBucket::new(settings.capacity, settings.refill_amount, settings.refill_interval)
        .map_err(|e| PceError::Config(e.to_string()))
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// # Errors
/// Returns `PceError::Cancelled` if the token fires before the sleep ends.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(PceError::Cancelled),
        () = tokio::time::sleep(duration) => Ok(()),
    }
}

fn admission_error(err: RateLimitError) -> PceError {
    match err {
        RateLimitError::Cancelled => PceError::Cancelled,
        RateLimitError::InvalidConfiguration(msg) => PceError::Config(msg),
    }
}

fn outgoing_headers(request: &RequestDescriptor, request_id: &str) -> Headers {
    let mut headers: Headers = request.headers().to_vec();
    if request.header(HEADER_ACCEPT).is_none() {
        headers.push((HEADER_ACCEPT.to_owned(), CONTENT_TYPE_JSON.to_owned()));
    }
    if request.header(HEADER_REQUEST_ID).is_none() {
        headers.push((HEADER_REQUEST_ID.to_owned(), request_id.to_owned()));
    }
    headers
}

fn classify_failure(request: &RequestDescriptor, response: &ResponseDescriptor) -> PceError {
    let method = request.method();
    let path = request.path().to_owned();
    let status = response.status;
    let body = body_excerpt(response);

    match StatusClass::of(status) {
        StatusClass::Rejected => PceError::RemoteRejected { method, path, status, body },
        StatusClass::Unavailable => PceError::RemoteUnavailable { method, path, status, body },
        _ => PceError::protocol(method, path, format!("unexpected status {status}")),
    }
}

fn body_excerpt(response: &ResponseDescriptor) -> String {
    let text = response.text();
    if text.len() <= ERROR_BODY_LIMIT {
        return text;
    }
    let mut end = ERROR_BODY_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
