//! Async job protocol: submit, poll, fetch
//!
//! A request marked `Prefer: respond-async` is answered with `202 Accepted`,
//! a `Location` to poll and a `Retry-After` hint. The job document at that
//! location moves from `pending` to `done` (with `result.href`) or `failed`.

use std::sync::Arc;
use std::time::Duration;

use policylink_domain::constants::{
    HEADER_LOCATION, HEADER_PREFER, HEADER_RETRY_AFTER, PREFER_RESPOND_ASYNC, STATUS_ACCEPTED,
};
use policylink_domain::{
    JobDocument, JobHandle, JobSettings, JobStatus, Method, PceError, RequestDescriptor,
    ResponseDescriptor, Result,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::executor::{sleep_or_cancel, RequestExecutor};

/// Drives one async job per [`AsyncJobPoller::submit_async`] call.
///
/// Holds no per-job state; every call owns its own poll loop.
#[derive(Debug, Clone)]
pub struct AsyncJobPoller {
    executor: Arc<RequestExecutor>,
    settings: JobSettings,
}

impl AsyncJobPoller {
    pub fn new(executor: Arc<RequestExecutor>, settings: JobSettings) -> Self {
        Self { executor, settings }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Submit `request` asynchronously and return the job's final resource.
    ///
    /// A 2xx other than 202 means the server answered synchronously; that
    /// response is returned unchanged.
    ///
    /// # Errors
    /// Everything [`RequestExecutor::execute`] returns, plus
    /// `AsyncJobFailed`, `PollLimitExceeded`, and `Protocol` for a missing
    /// `Location`, an unparsable or unknown job status, or a `done` job
    /// without `result.href`.
    #[instrument(skip(self, request, cancel), fields(method = %request.method(), path = %request.path()))]
    pub async fn submit_async(
        &self,
        request: RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ResponseDescriptor> {
        let request = request.with_header(HEADER_PREFER, PREFER_RESPOND_ASYNC);
        let accepted = self.executor.execute(&request, cancel).await?;

        if accepted.status != STATUS_ACCEPTED {
            debug!(status = accepted.status, "server answered synchronously");
            return Ok(accepted);
        }

        let mut handle = job_handle(&request, &accepted)?;
        info!(status_url = %handle.status_url, "async job accepted");

        let result_url = self.wait_for_completion(&mut handle, cancel).await?;
        self.executor.execute(&RequestDescriptor::get(result_url), cancel).await
    }

    /// Poll the handle's status location until the job is terminal.
    ///
    /// Returns the result location and records it on the handle.
    ///
    /// # Errors
    /// `AsyncJobFailed`, `PollLimitExceeded`, `Protocol`, `Cancelled`, or any
    /// executor failure on a status poll.
    pub async fn wait_for_completion(
        &self,
        handle: &mut JobHandle,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let poll = RequestDescriptor::get(handle.status_url.clone());
        let mut wait = self.wait_or_default(handle.initial_retry_after);

        for attempt in 1..=self.settings.max_polls {
            sleep_or_cancel(wait, cancel).await?;

            let response = self.executor.execute(&poll, cancel).await?;
            let document: JobDocument = response.json().map_err(|e| {
                PceError::protocol(
                    Method::Get,
                    &handle.status_url,
                    format!("job status is not valid JSON: {e}"),
                )
            })?;

            match document.job_status() {
                Ok(JobStatus::Pending) => {
                    wait = self.wait_or_default(retry_after(&response));
                    debug!(attempt, wait_ms = millis(wait), "job still pending");
                }
                Ok(JobStatus::Failed) => {
                    warn!(status_url = %handle.status_url, "async job failed");
                    return Err(PceError::AsyncJobFailed { status_url: handle.status_url.clone() });
                }
                Ok(JobStatus::Done) => {
                    let href = document
                        .result
                        .map(|result| result.href)
                        .filter(|href| !href.trim().is_empty())
                        .ok_or_else(|| {
                            PceError::protocol(
                                Method::Get,
                                &handle.status_url,
                                "job reported done without result.href",
                            )
                        })?;
                    info!(attempt, result_url = %href, "async job done");
                    handle.result_url = Some(href.clone());
                    return Ok(href);
                }
                Err(unknown) => {
                    return Err(PceError::protocol(
                        Method::Get,
                        &handle.status_url,
                        unknown.to_string(),
                    ));
                }
            }
        }

        Err(PceError::PollLimitExceeded {
            status_url: handle.status_url.clone(),
            polls: self.settings.max_polls,
        })
    }

    /// Server hint, or the configured default when it is absent or zero.
    fn wait_or_default(&self, hint: Option<Duration>) -> Duration {
        hint.filter(|wait| !wait.is_zero()).unwrap_or(self.settings.default_wait)
    }
}

/// Build a [`JobHandle`] from a 202 response.
fn job_handle(request: &RequestDescriptor, accepted: &ResponseDescriptor) -> Result<JobHandle> {
    let location = accepted
        .header(HEADER_LOCATION)
        .map(str::trim)
        .filter(|location| !location.is_empty())
        .ok_or_else(|| {
            PceError::protocol(request.method(), request.path(), "202 response without Location")
        })?;
    Ok(JobHandle::new(location, retry_after(accepted)))
}

/// `Retry-After` as integer seconds. Unparsable values count as absent.
fn retry_after(response: &ResponseDescriptor) -> Option<Duration> {
    response
        .header(HEADER_RETRY_AFTER)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(headers: &[(&str, &str)]) -> ResponseDescriptor {
        ResponseDescriptor::new(
            202,
            headers.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect(),
            Vec::new(),
        )
    }

    #[test]
    fn test_handle_from_accepted_response() {
        let request = RequestDescriptor::get("/orgs/1/workloads");
        let response = accepted(&[("Location", "/orgs/1/jobs/42"), ("Retry-After", "5")]);

        let handle = job_handle(&request, &response).unwrap();
        assert_eq!(handle.status_url, "/orgs/1/jobs/42");
        assert_eq!(handle.initial_retry_after, Some(Duration::from_secs(5)));
        assert!(handle.result_url.is_none());
    }

    #[test]
    fn test_missing_location_is_protocol_error() {
        let request = RequestDescriptor::get("/orgs/1/workloads");
        let err = job_handle(&request, &accepted(&[("Retry-After", "5")])).unwrap_err();
        assert!(matches!(err, PceError::Protocol { .. }));
    }

    #[test]
    fn test_retry_after_parsing() {
        assert_eq!(retry_after(&accepted(&[("retry-after", " 12 ")])), Some(Duration::from_secs(12)));
        assert_eq!(retry_after(&accepted(&[("Retry-After", "soon")])), None);
        assert_eq!(retry_after(&accepted(&[])), None);
    }
}
