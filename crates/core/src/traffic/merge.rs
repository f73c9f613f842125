//! Deduplicating merge of partial flow sets

use std::collections::HashSet;

use policylink_domain::{FlowKey, TrafficFlow};

/// Insertion-ordered set of flows keyed by [`TrafficFlow::identity`].
///
/// The first occurrence of an identity wins; later duplicates are dropped.
#[derive(Debug, Default, Clone)]
pub struct FlowSet {
    seen: HashSet<FlowKey>,
    flows: Vec<TrafficFlow>,
}

impl FlowSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { seen: HashSet::with_capacity(capacity), flows: Vec::with_capacity(capacity) }
    }

    /// Add one flow. Returns `false` if its identity was already present.
    pub fn insert(&mut self, flow: TrafficFlow) -> bool {
        if !self.seen.insert(flow.identity()) {
            return false;
        }
        self.flows.push(flow);
        true
    }

    /// Merge a partial result set, returning how many flows were new.
    pub fn merge(&mut self, partial: impl IntoIterator<Item = TrafficFlow>) -> usize {
        let mut added = 0;
        for flow in partial {
            if self.insert(flow) {
                added += 1;
            }
        }
        added
    }

    pub fn contains(&self, key: &FlowKey) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrafficFlow> {
        self.flows.iter()
    }

    pub fn into_vec(self) -> Vec<TrafficFlow> {
        self.flows
    }
}

impl FromIterator<TrafficFlow> for FlowSet {
    fn from_iter<I: IntoIterator<Item = TrafficFlow>>(iter: I) -> Self {
        let mut set = Self::new();
        set.merge(iter);
        set
    }
}
