//! Traffic query descriptors and flow records
//!
//! A [`TrafficQuery`] is an immutable value. Narrowing (by protocol bucket,
//! by port, by excluded ports) always returns a new query, so one query can
//! be shared by concurrently running decomposition branches.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::Href;
use crate::constants::{PROTO_TCP, PROTO_UDP};

// ============================================================================
// Query filters
// ============================================================================

/// One actor term in a source/destination filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Label(Href),
    LabelGroup(Href),
    Workload(Href),
    IpList(Href),
    IpAddress(String),
    /// Wildcard actor such as `ams` (all managed systems)
    Actors(String),
}

/// Source or destination filter.
///
/// `include` is a disjunction of conjunctions (each inner list is ANDed, the
/// outer list ORed); `exclude` removes any flow matching one of its actors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorSet {
    pub include: Vec<Vec<Actor>>,
    pub exclude: Vec<Actor>,
}

impl ActorSet {
    /// Matches every actor.
    pub fn any() -> Self {
        Self { include: vec![Vec::new()], exclude: Vec::new() }
    }

    pub fn including(mut self, all_of: Vec<Actor>) -> Self {
        self.include.retain(|group| !group.is_empty());
        self.include.push(all_of);
        self
    }

    pub fn excluding(mut self, actor: Actor) -> Self {
        self.exclude.push(actor);
        self
    }
}

impl Default for ActorSet {
    fn default() -> Self {
        Self::any()
    }
}

/// Protocol/port service term. Absent fields match anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_port: Option<u16>,
}

impl ServiceFilter {
    pub fn protocol(proto: u8) -> Self {
        Self { proto: Some(proto), port: None, to_port: None }
    }

    pub fn port(proto: u8, port: u16) -> Self {
        Self { proto: Some(proto), port: Some(port), to_port: None }
    }

    pub fn port_range(proto: u8, from: u16, to: u16) -> Self {
        Self { proto: Some(proto), port: Some(from), to_port: Some(to) }
    }

    /// Whether traffic on `proto`/`port` can satisfy this term.
    pub fn admits(&self, proto: u8, port: u16) -> bool {
        if self.proto.is_some_and(|p| p != proto) {
            return false;
        }
        match (self.port, self.to_port) {
            (None, _) => true,
            (Some(from), Some(to)) => (from..=to).contains(&port),
            (Some(exact), None) => exact == port,
        }
    }
}

/// Service filter: `include` terms are ORed; an empty `include` means any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSet {
    pub include: Vec<ServiceFilter>,
    pub exclude: Vec<ServiceFilter>,
}

/// Inclusive query window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(rename = "start_date")]
    pub start: DateTime<Utc>,
    #[serde(rename = "end_date")]
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

/// Policy verdict recorded for a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    Allowed,
    PotentiallyBlocked,
    Blocked,
    #[serde(other)]
    Unknown,
}

/// First-level partition of a traffic query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolBucket {
    Tcp,
    Udp,
    /// Everything that is neither TCP nor UDP
    Other,
}

impl ProtocolBucket {
    /// Buckets in the order they are issued.
    pub const ALL: [ProtocolBucket; 3] = [Self::Tcp, Self::Udp, Self::Other];

    /// IANA protocol number, `None` for the catch-all bucket.
    pub const fn proto(&self) -> Option<u8> {
        match self {
            Self::Tcp => Some(PROTO_TCP),
            Self::Udp => Some(PROTO_UDP),
            Self::Other => None,
        }
    }
}

impl fmt::Display for ProtocolBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Other => "other",
        })
    }
}

// ============================================================================
// Traffic query
// ============================================================================

/// Explorer-style traffic query, serialized as the request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficQuery {
    pub sources: ActorSet,
    pub destinations: ActorSet,
    pub services: ServiceSet,
    #[serde(flatten)]
    pub range: TimeRange,
    pub policy_decisions: Vec<PolicyDecision>,
    pub max_results: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_name: Option<String>,
}

impl TrafficQuery {
    /// Unfiltered query over `range`.
    pub fn new(range: TimeRange) -> Self {
        Self {
            sources: ActorSet::any(),
            destinations: ActorSet::any(),
            services: ServiceSet::default(),
            range,
            policy_decisions: Vec::new(),
            max_results: 0,
            query_name: None,
        }
    }

    pub fn with_sources(mut self, sources: ActorSet) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_destinations(mut self, destinations: ActorSet) -> Self {
        self.destinations = destinations;
        self
    }

    pub fn with_services(mut self, services: ServiceSet) -> Self {
        self.services = services;
        self
    }

    pub fn with_policy_decisions(mut self, decisions: Vec<PolicyDecision>) -> Self {
        self.policy_decisions = decisions;
        self
    }

    /// Per-request result cap. Bounded by the client's `query.max_results`;
    /// `0` leaves the client cap in force.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_query_name(mut self, name: impl Into<String>) -> Self {
        self.query_name = Some(name.into());
        self
    }

    /// Restrict this query to one protocol bucket.
    ///
    /// Existing service includes are intersected with the bucket. Returns
    /// `None` when no include term can match the bucket, i.e. the narrowed
    /// query is provably empty and need not be sent.
    pub fn narrow_to_bucket(&self, bucket: ProtocolBucket) -> Option<Self> {
        let mut narrowed = self.clone();

        match bucket.proto() {
            Some(proto) => {
                if self.services.include.is_empty() {
                    narrowed.services.include = vec![ServiceFilter::protocol(proto)];
                } else {
                    narrowed.services.include = self
                        .services
                        .include
                        .iter()
                        .filter_map(|term| match term.proto {
                            None => Some(ServiceFilter { proto: Some(proto), ..term.clone() }),
                            Some(p) if p == proto => Some(term.clone()),
                            Some(_) => None,
                        })
                        .collect();
                    if narrowed.services.include.is_empty() {
                        return None;
                    }
                }
            }
            None => {
                if !self.services.include.is_empty() {
                    narrowed.services.include.retain(|term| {
                        !matches!(term.proto, Some(PROTO_TCP) | Some(PROTO_UDP))
                    });
                    if narrowed.services.include.is_empty() {
                        return None;
                    }
                }
                for proto in [PROTO_TCP, PROTO_UDP] {
                    let term = ServiceFilter::protocol(proto);
                    if !narrowed.services.exclude.contains(&term) {
                        narrowed.services.exclude.push(term);
                    }
                }
            }
        }

        Some(narrowed)
    }

    /// Restrict a protocol-bucket query to exactly one port.
    ///
    /// Returns `None` when the existing include terms cannot admit the port.
    pub fn narrow_to_port(&self, proto: u8, port: u16) -> Option<Self> {
        let admitted = self.services.include.is_empty()
            || self.services.include.iter().any(|term| term.admits(proto, port));
        if !admitted {
            return None;
        }

        let mut narrowed = self.clone();
        narrowed.services.include = vec![ServiceFilter::port(proto, port)];
        Some(narrowed)
    }

    /// Add one exclusion term per port for `proto`, keeping includes intact.
    pub fn excluding_ports(&self, proto: u8, ports: &[u16]) -> Self {
        let mut narrowed = self.clone();
        for &port in ports {
            let term = ServiceFilter::port(proto, port);
            if !narrowed.services.exclude.contains(&term) {
                narrowed.services.exclude.push(term);
            }
        }
        narrowed
    }
}

// ============================================================================
// Flow records
// ============================================================================

/// Workload reference attached to a flow endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// Source or destination of a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEndpoint {
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<WorkloadRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
}

impl FlowEndpoint {
    pub fn ip(ip: impl Into<String>) -> Self {
        Self { ip: ip.into(), workload: None, fqdn: None }
    }

    fn identity(&self) -> String {
        match &self.workload {
            Some(workload) => format!("{}@{}", self.ip, workload.href),
            None => self.ip.clone(),
        }
    }
}

/// Service a flow was observed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowService {
    pub proto: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
}

impl FlowService {
    pub fn new(proto: u8, port: Option<u16>) -> Self {
        Self { proto, port, process_name: None }
    }
}

/// First/last observation timestamps, kept verbatim for stable identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampRange {
    pub first_detected: String,
    pub last_detected: String,
}

/// One aggregated traffic flow returned by a traffic query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficFlow {
    pub src: FlowEndpoint,
    pub dst: FlowEndpoint,
    pub service: FlowService,
    pub num_connections: u64,
    pub timestamp_range: TimestampRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_decision: Option<PolicyDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_direction: Option<String>,
    /// Fields this client does not model, preserved for callers
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TrafficFlow {
    pub fn new(
        src: FlowEndpoint,
        dst: FlowEndpoint,
        service: FlowService,
        num_connections: u64,
        timestamp_range: TimestampRange,
    ) -> Self {
        Self {
            src,
            dst,
            service,
            num_connections,
            timestamp_range,
            policy_decision: None,
            transmission: None,
            flow_direction: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn proto(&self) -> u8 {
        self.service.proto
    }

    pub fn port(&self) -> Option<u16> {
        self.service.port
    }

    /// Composite identity used for deduplication: destination, source,
    /// service, time-range bounds, transmission and connection count.
    pub fn identity(&self) -> FlowKey {
        let service = format!(
            "{}/{}/{}",
            self.service.proto,
            self.service.port.map(|p| p.to_string()).unwrap_or_default(),
            self.service.process_name.as_deref().unwrap_or_default()
        );
        FlowKey(format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.dst.identity(),
            self.src.identity(),
            service,
            self.timestamp_range.first_detected,
            self.timestamp_range.last_detected,
            self.transmission.as_deref().unwrap_or_default(),
            self.num_connections
        ))
    }
}

/// Composite identity of a [`TrafficFlow`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey(String);

impl FlowKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn range() -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
        )
    }

    fn flow(proto: u8, port: u16, connections: u64) -> TrafficFlow {
        TrafficFlow::new(
            FlowEndpoint::ip("10.0.0.1"),
            FlowEndpoint::ip("10.0.0.2"),
            FlowService::new(proto, Some(port)),
            connections,
            TimestampRange {
                first_detected: "2024-01-02T00:00:00Z".into(),
                last_detected: "2024-01-03T00:00:00Z".into(),
            },
        )
    }

    #[test]
    fn test_query_wire_shape() {
        let query = TrafficQuery::new(range())
            .with_max_results(1000)
            .with_policy_decisions(vec![PolicyDecision::PotentiallyBlocked]);
        let json = serde_json::to_value(&query).unwrap();

        assert_eq!(json["sources"]["include"], serde_json::json!([[]]));
        assert_eq!(json["start_date"], "2024-01-01T00:00:00Z");
        assert_eq!(json["policy_decisions"], serde_json::json!(["potentially_blocked"]));
        assert_eq!(json["max_results"], 1000);
        assert!(json.get("query_name").is_none());
    }

    #[test]
    fn test_narrow_to_tcp_leaves_original_untouched() {
        let query = TrafficQuery::new(range());
        let tcp = query.narrow_to_bucket(ProtocolBucket::Tcp).unwrap();

        assert_eq!(tcp.services.include, vec![ServiceFilter::protocol(PROTO_TCP)]);
        assert!(query.services.include.is_empty());
    }

    #[test]
    fn test_other_bucket_excludes_tcp_and_udp() {
        let other = TrafficQuery::new(range()).narrow_to_bucket(ProtocolBucket::Other).unwrap();

        assert!(other.services.include.is_empty());
        assert_eq!(
            other.services.exclude,
            vec![ServiceFilter::protocol(PROTO_TCP), ServiceFilter::protocol(PROTO_UDP)]
        );
    }

    #[test]
    fn test_bucket_intersects_existing_includes() {
        let query = TrafficQuery::new(range()).with_services(ServiceSet {
            include: vec![ServiceFilter::port(PROTO_TCP, 443)],
            exclude: Vec::new(),
        });

        let tcp = query.narrow_to_bucket(ProtocolBucket::Tcp).unwrap();
        assert_eq!(tcp.services.include, vec![ServiceFilter::port(PROTO_TCP, 443)]);
        assert!(query.narrow_to_bucket(ProtocolBucket::Udp).is_none());
        assert!(query.narrow_to_bucket(ProtocolBucket::Other).is_none());
    }

    #[test]
    fn test_narrow_to_port_respects_ranges() {
        let query = TrafficQuery::new(range()).with_services(ServiceSet {
            include: vec![ServiceFilter::port_range(PROTO_TCP, 8000, 8100)],
            exclude: Vec::new(),
        });

        let narrowed = query.narrow_to_port(PROTO_TCP, 8080).unwrap();
        assert_eq!(narrowed.services.include, vec![ServiceFilter::port(PROTO_TCP, 8080)]);
        assert!(query.narrow_to_port(PROTO_TCP, 9000).is_none());
    }

    #[test]
    fn test_excluding_ports_is_exact() {
        let query = TrafficQuery::new(range()).narrow_to_bucket(ProtocolBucket::Udp).unwrap();
        let catch_all = query.excluding_ports(PROTO_UDP, &[53, 123, 53]);

        assert_eq!(catch_all.services.include, vec![ServiceFilter::protocol(PROTO_UDP)]);
        assert_eq!(
            catch_all.services.exclude,
            vec![ServiceFilter::port(PROTO_UDP, 53), ServiceFilter::port(PROTO_UDP, 123)]
        );
    }

    #[test]
    fn test_identity_distinguishes_connection_count() {
        assert_eq!(flow(6, 80, 1).identity(), flow(6, 80, 1).identity());
        assert_ne!(flow(6, 80, 1).identity(), flow(6, 80, 2).identity());
        assert_ne!(flow(6, 80, 1).identity(), flow(17, 80, 1).identity());
    }

    #[test]
    fn test_flow_parses_and_keeps_unknown_fields() {
        let flow: TrafficFlow = serde_json::from_str(
            r#"{
                "src": {"ip": "10.1.1.1", "workload": {"href": "/orgs/1/workloads/a", "hostname": "web1"}},
                "dst": {"ip": "10.1.1.2"},
                "service": {"port": 5432, "proto": 6, "process_name": "postgres"},
                "num_connections": 12,
                "timestamp_range": {"first_detected": "2024-01-01T00:00:00Z", "last_detected": "2024-01-02T00:00:00Z"},
                "policy_decision": "allowed",
                "transmission": "unicast",
                "state": "snapshot"
            }"#,
        )
        .unwrap();

        assert_eq!(flow.port(), Some(5432));
        assert_eq!(flow.policy_decision, Some(PolicyDecision::Allowed));
        assert_eq!(flow.extra["state"], "snapshot");
        assert!(flow.identity().as_str().contains("10.1.1.1@/orgs/1/workloads/a"));
    }

    #[test]
    fn test_unknown_policy_decision_falls_back() {
        let decision: PolicyDecision = serde_json::from_str(r#""blocked_by_boundary""#).unwrap();
        assert_eq!(decision, PolicyDecision::Unknown);
    }
}
