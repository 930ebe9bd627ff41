//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! proxy. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the reverse proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream backend definitions, in pool order.
    pub upstreams: Vec<UpstreamConfig>,

    /// Load balancing policy.
    pub load_balancing: PolicyConfig,

    /// Maximum concurrent requests per upstream host (0 = unlimited).
    pub max_requests_per_host: usize,

    /// Proxy addresses whose forwarding headers are trusted when
    /// resolving the client IP and scheme.
    pub trusted_proxies: Vec<std::net::IpAddr>,

    /// Response handlers evaluated against upstream responses.
    pub handle_response: Vec<ResponseHandlerConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// One upstream backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Dial address (e.g., "127.0.0.1:3000").
    pub dial: String,
}

/// Load balancing policy selection.
///
/// Tagged by policy name; each variant carries the parameters that
/// policy understands. Hash policies with a selection key take a
/// `fallback` used when the key is absent from the request. The
/// fallback is a [`FallbackConfig`], which has no fallback field of
/// its own, so delegation is structurally one level deep.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PolicyConfig {
    #[default]
    Random,
    RandomChoose {
        /// Sub-pool size sampled from the larger pool. Default 2.
        choose: Option<usize>,
    },
    LeastConn,
    RoundRobin,
    WeightedRoundRobin {
        /// Weight of each upstream, corresponding with the configured
        /// upstream order. Every weight must be at least 1.
        weights: Vec<u32>,
    },
    First,
    IpHash,
    ClientIpHash,
    UriHash,
    Query {
        /// Query key whose joined values are hashed.
        key: String,
        fallback: Option<FallbackConfig>,
    },
    Header {
        /// Header field whose value is hashed.
        field: String,
        fallback: Option<FallbackConfig>,
    },
    Cookie {
        /// Cookie name. Defaults to "lb".
        name: Option<String>,
        /// HMAC-SHA256 secret used to digest the chosen upstream.
        secret: Option<String>,
        /// Cookie Max-Age in seconds. Default is no expiry.
        max_age_secs: Option<u64>,
        fallback: Option<FallbackConfig>,
    },
}

/// Fallback policy for key-based selection. A strict subset of
/// [`PolicyConfig`]: the delegating variants are absent so a fallback
/// can never delegate further.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FallbackConfig {
    #[default]
    Random,
    RandomChoose {
        choose: Option<usize>,
    },
    LeastConn,
    RoundRobin,
    WeightedRoundRobin {
        weights: Vec<u32>,
    },
    First,
    IpHash,
    ClientIpHash,
    UriHash,
}

/// One response handler: an optional matcher, an optional status-code
/// override, and a route sub-pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResponseHandlerConfig {
    /// Matcher evaluated against the upstream response. Entries
    /// without a matcher act as catch-alls and are moved to the end of
    /// the handler list at provisioning time.
    #[serde(rename = "match")]
    pub matcher: Option<MatchConfig>,

    /// Status-code override. May contain `{placeholder}` expressions.
    pub status_code: Option<String>,

    /// Route sub-pipeline run when this handler is selected and no
    /// status-code override applies.
    pub routes: Vec<RouteConfig>,
}

/// Response matcher settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MatchConfig {
    /// Status codes to match: exact ("404") or a class ("2xx").
    /// An empty list matches any status.
    pub status: Vec<String>,

    /// Header fields that must be present, optionally with an exact
    /// value.
    pub headers: Vec<HeaderMatchConfig>,
}

/// One header condition of a response matcher.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeaderMatchConfig {
    pub field: String,
    pub value: Option<String>,
}

/// One handler of a response-route sub-pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "handler", rename_all = "snake_case")]
pub enum RouteConfig {
    /// Write the buffered upstream response to the client, optionally
    /// overriding its status code. Terminal.
    CopyResponse {
        status_code: Option<String>,
    },
    /// Copy a filtered subset of the buffered response's headers onto
    /// the outbound response, then continue the pipeline.
    CopyResponseHeaders {
        #[serde(default)]
        include: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
    },
    /// Write a fixed response.
    StaticResponse {
        #[serde(default = "default_static_status")]
        status_code: u16,
        #[serde(default)]
        headers: Vec<(String, String)>,
        #[serde(default)]
        body: String,
    },
}

fn default_static_status() -> u16 {
    200
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Flush interval for streamed response bodies, in milliseconds.
    /// Negative flushes after every write (SSE-style), 0 leaves
    /// flushing to the transport, positive flushes periodically.
    pub flush_interval_ms: i64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            flush_interval_ms: 0,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
