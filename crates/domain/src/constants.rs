//! Protocol constants
//!
//! Centralized location for the wire-level names and defaults used by the
//! PCE client.

// Async job protocol
pub const HEADER_PREFER: &str = "Prefer";
pub const PREFER_RESPOND_ASYNC: &str = "respond-async";
pub const HEADER_LOCATION: &str = "Location";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";
pub const STATUS_ACCEPTED: u16 = 202;
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

// Collections
pub const HEADER_TOTAL_COUNT: &str = "X-Total-Count";
pub const HEADER_REQUEST_ID: &str = "X-Request-Id";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_ACCEPT: &str = "Accept";
pub const CONTENT_TYPE_JSON: &str = "application/json";

// IANA protocol numbers used by traffic queries
pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

// Traffic endpoints (relative to `/orgs/{org_id}`)
pub const TRAFFIC_SYNC_QUERY_PATH: &str = "/traffic_flows/traffic_analysis_queries";
pub const TRAFFIC_ASYNC_QUERY_PATH: &str = "/traffic_flows/async_queries";

// Client defaults
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_BACKOFF_SECS: u64 = 30;
pub const DEFAULT_JITTER_RANGE_SECS: u64 = 15;
pub const DEFAULT_JOB_WAIT_SECS: u64 = 10;
pub const DEFAULT_MAX_POLLS: u32 = 360;
pub const DEFAULT_TRUNCATION_THRESHOLD: usize = 90_000;
pub const DEFAULT_MAX_RESULTS: usize = 100_000;
pub const DEFAULT_MAX_CONCURRENT_SUBQUERIES: usize = 4;
pub const DEFAULT_RATE_CAPACITY: u64 = 125;
pub const DEFAULT_RATE_REFILL_AMOUNT: u64 = 125;
pub const DEFAULT_RATE_REFILL_INTERVAL_SECS: u64 = 60;
