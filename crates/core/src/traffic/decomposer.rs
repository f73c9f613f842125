//! Truncation-aware traffic queries
//!
//! The server silently caps large traffic result sets. A result at or above
//! the configured threshold is treated as truncated and the query is
//! re-issued as narrower sub-queries: first by protocol bucket, then (for
//! TCP and UDP buckets still at the threshold) by port. Partial results are
//! merged with [`FlowSet`] so no flow identity appears twice.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use policylink_domain::constants::{TRAFFIC_ASYNC_QUERY_PATH, TRAFFIC_SYNC_QUERY_PATH};
use policylink_domain::{
    Method, PceError, QuerySettings, RequestDescriptor, Result, TrafficFlow, TrafficQuery,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::merge::FlowSet;
use super::partition::{port_branches, protocol_branches, Branch, BranchKind};
use crate::executor::RequestExecutor;
use crate::jobs::AsyncJobPoller;

/// Runs traffic queries with protocol/port decomposition.
#[derive(Debug, Clone)]
pub struct TrafficDecomposer {
    executor: Arc<RequestExecutor>,
    poller: AsyncJobPoller,
    settings: QuerySettings,
    org_prefix: String,
}

impl TrafficDecomposer {
    pub fn new(
        executor: Arc<RequestExecutor>,
        poller: AsyncJobPoller,
        settings: QuerySettings,
        org_id: u64,
    ) -> Self {
        Self { executor, poller, settings, org_prefix: format!("/orgs/{org_id}") }
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Run `query` and return every matching flow exactly once.
    ///
    /// Sub-queries of one level run concurrently (at most
    /// `max_concurrent_subqueries` in flight) and are merged only once the
    /// whole level has finished. If any branch fails, its siblings are
    /// cancelled and the error names the failing branch.
    ///
    /// # Errors
    /// Failures of the initial query are returned as-is; failures of a
    /// sub-query are wrapped in `PceError::Decomposition` naming the branch.
    #[instrument(skip(self, query, cancel), fields(threshold = self.settings.truncation_threshold))]
    pub async fn query(
        &self,
        query: &TrafficQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<TrafficFlow>> {
        let cancel = cancel.child_token();
        let _cancel_on_exit = cancel.clone().drop_guard();
        let threshold = self.settings.truncation_threshold;

        let unfiltered = Branch { kind: BranchKind::Unfiltered, query: query.clone() };
        let initial = self.run_branch(&unfiltered, &cancel).await?;
        if initial.len() < threshold {
            debug!(count = initial.len(), "below truncation threshold");
            return Ok(initial.into_iter().collect::<FlowSet>().into_vec());
        }

        info!(count = initial.len(), "result at truncation threshold, splitting by protocol");
        let buckets = protocol_branches(query);
        let bucket_results = self.run_level(&buckets, &cancel).await?;

        let mut merged = FlowSet::new();
        let mut port_level = Vec::new();
        for (branch, flows) in buckets.iter().zip(bucket_results) {
            let BranchKind::Bucket(bucket) = branch.kind else { continue };
            match bucket.proto() {
                Some(proto) if flows.len() >= threshold => {
                    let branches = port_branches(&branch.query, proto, &flows);
                    info!(
                        bucket = %bucket,
                        count = flows.len(),
                        subqueries = branches.len(),
                        "bucket at truncation threshold, splitting by port"
                    );
                    port_level.extend(branches);
                }
                _ => {
                    debug!(bucket = %bucket, count = flows.len(), "bucket accepted");
                    merged.merge(flows);
                }
            }
        }

        if !port_level.is_empty() {
            let port_results = self.run_level(&port_level, &cancel).await?;
            for (branch, flows) in port_level.iter().zip(port_results) {
                if flows.len() >= threshold {
                    warn!(
                        branch = %branch.kind,
                        count = flows.len(),
                        "port-level result still at truncation threshold"
                    );
                }
                merged.merge(flows);
            }
        }

        info!(total = merged.len(), "decomposed query complete");
        Ok(merged.into_vec())
    }

    /// Run every branch of one level; results come back in branch order.
    async fn run_level(
        &self,
        branches: &[Branch],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<TrafficFlow>>> {
        let pending: Vec<_> =
            branches.iter().map(|branch| self.run_branch(branch, cancel)).collect();
        futures::stream::iter(pending)
            .buffered(self.settings.max_concurrent_subqueries.max(1))
            .try_collect()
            .await
    }

    /// Per-request result cap: the caller's cap, bounded by the client's.
    fn result_cap(&self, requested: usize) -> usize {
        match requested {
            0 => self.settings.max_results,
            requested => requested.min(self.settings.max_results),
        }
    }

    async fn run_branch(
        &self,
        branch: &Branch,
        cancel: &CancellationToken,
    ) -> Result<Vec<TrafficFlow>> {
        let flows = self.run_single(&branch.query, cancel).await.map_err(|e| match branch.kind {
            BranchKind::Unfiltered => e,
            _ => e.in_branch(branch.label()),
        })?;
        debug!(branch = %branch.kind, count = flows.len(), "branch finished");
        Ok(flows)
    }

    /// Execute one traffic query without decomposition.
    ///
    /// The request carries the smaller of the query's own `max_results` and
    /// the client-wide cap; `0` on the query means "use the client cap".
    ///
    /// # Errors
    /// Any executor or poller failure, or `Protocol` if the body is not a
    /// JSON array of flows.
    pub async fn run_single(
        &self,
        query: &TrafficQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<TrafficFlow>> {
        let mut query = query.clone();
        query.max_results = self.result_cap(query.max_results);

        let path = if self.settings.async_queries {
            format!("{}{TRAFFIC_ASYNC_QUERY_PATH}", self.org_prefix)
        } else {
            format!("{}{TRAFFIC_SYNC_QUERY_PATH}", self.org_prefix)
        };
        let request = RequestDescriptor::post(path.as_str()).with_json(&query)?;

        let response = if self.settings.async_queries {
            self.poller.submit_async(request, cancel).await?
        } else {
            self.executor.execute(&request, cancel).await?
        };

        response.json::<Vec<TrafficFlow>>().map_err(|e| {
            PceError::protocol(Method::Post, path, format!("traffic result is not a flow list: {e}"))
        })
    }
}
