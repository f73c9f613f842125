//! Pure planning of decomposition levels
//!
//! Level one splits a query into the TCP, UDP and "other" protocol buckets.
//! Level two splits an over-threshold TCP or UDP bucket into one query per
//! observed port plus a catch-all that excludes exactly those ports.

use std::collections::BTreeSet;
use std::fmt;

use policylink_domain::{ProtocolBucket, TrafficFlow, TrafficQuery};

/// Which slice of the traffic a branch covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Unfiltered,
    Bucket(ProtocolBucket),
    Port { proto: u8, port: u16 },
    CatchAll { proto: u8, excluded: usize },
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unfiltered => f.write_str("unfiltered"),
            Self::Bucket(bucket) => write!(f, "proto={bucket}"),
            Self::Port { proto, port } => write!(f, "proto={proto} port={port}"),
            Self::CatchAll { proto, excluded } => {
                write!(f, "proto={proto} catch-all excluding {excluded} ports")
            }
        }
    }
}

/// One sub-query of a decomposition level.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub kind: BranchKind,
    pub query: TrafficQuery,
}

impl Branch {
    pub fn label(&self) -> String {
        self.kind.to_string()
    }
}

/// The three protocol buckets of `query`, skipping buckets the query's own
/// service filter already rules out.
pub fn protocol_branches(query: &TrafficQuery) -> Vec<Branch> {
    ProtocolBucket::ALL
        .into_iter()
        .filter_map(|bucket| {
            query
                .narrow_to_bucket(bucket)
                .map(|narrowed| Branch { kind: BranchKind::Bucket(bucket), query: narrowed })
        })
        .collect()
}

/// Distinct ports observed for `proto`, ascending.
pub fn distinct_ports(flows: &[TrafficFlow], proto: u8) -> Vec<u16> {
    flows
        .iter()
        .filter(|flow| flow.proto() == proto)
        .filter_map(TrafficFlow::port)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Port-level branches for one over-threshold protocol bucket.
///
/// The catch-all is always emitted, even when every observed port got its
/// own query, because truncation may have hidden ports entirely. It
/// excludes exactly the ports that were queried individually.
pub fn port_branches(bucket_query: &TrafficQuery, proto: u8, observed: &[TrafficFlow]) -> Vec<Branch> {
    let mut branches = Vec::new();
    let mut queried = Vec::new();

    for port in distinct_ports(observed, proto) {
        if let Some(narrowed) = bucket_query.narrow_to_port(proto, port) {
            queried.push(port);
            branches.push(Branch { kind: BranchKind::Port { proto, port }, query: narrowed });
        }
    }

    branches.push(Branch {
        kind: BranchKind::CatchAll { proto, excluded: queried.len() },
        query: bucket_query.excluding_ports(proto, &queried),
    });
    branches
}
