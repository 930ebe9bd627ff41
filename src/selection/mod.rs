//! Upstream selection policies.
//!
//! Each policy implements [`Policy`] and picks one available host from
//! the pool for a given request. Policies are provisioned once from
//! configuration and shared across requests, so any mutable state
//! (round-robin cursors) is atomic.
//!
//! # Policies
//!
//! | Policy                 | Basis                                   |
//! |------------------------|-----------------------------------------|
//! | `random`               | uniform over available hosts            |
//! | `random_choose`        | least-loaded of a random sub-pool       |
//! | `least_conn`           | fewest active requests, random ties     |
//! | `round_robin`          | shared atomic cursor                    |
//! | `weighted_round_robin` | cursor over configured weights          |
//! | `first`                | first available in configured order     |
//! | `ip_hash`              | rendezvous hash of the peer address     |
//! | `client_ip_hash`       | rendezvous hash of the client address   |
//! | `uri_hash`             | rendezvous hash of the request URI      |
//! | `query`                | rendezvous hash of a query value        |
//! | `header`               | rendezvous hash of a header value       |
//! | `cookie`               | HMAC sticky cookie                      |

pub mod cookie;
pub mod first;
pub mod hashing;
pub mod least_conn;
pub mod random;
pub mod round_robin;

use std::sync::Arc;

use http::HeaderMap;

use crate::config::{FallbackConfig, PolicyConfig};
use crate::http::request::RequestContext;
use crate::upstream::Host;

pub use cookie::CookieHash;
pub use first::First;
pub use hashing::{ClientIpHash, HeaderHash, IpHash, QueryHash, UriHash};
pub use least_conn::LeastConn;
pub use random::{Random, RandomChoose};
pub use round_robin::{RoundRobin, WeightedRoundRobin};

/// A load balancing selection policy.
///
/// `select` returns `None` when no host in the pool is available. The
/// outbound response headers are passed so sticky policies can set a
/// cookie; most policies ignore them.
pub trait Policy: Send + Sync {
    fn select(
        &self,
        pool: &[Arc<Host>],
        req: &RequestContext<'_>,
        resp: Option<&mut HeaderMap>,
    ) -> Option<Arc<Host>>;
}

/// Build a policy from its configuration.
///
/// Assumes the configuration has passed validation; defaults are
/// applied here (sub-pool size 2, cookie name "lb").
pub fn from_config(cfg: &PolicyConfig) -> Box<dyn Policy> {
    match cfg {
        PolicyConfig::Random => Box::new(Random),
        PolicyConfig::RandomChoose { choose } => Box::new(RandomChoose::new(choose.unwrap_or(2))),
        PolicyConfig::LeastConn => Box::new(LeastConn),
        PolicyConfig::RoundRobin => Box::new(RoundRobin::new()),
        PolicyConfig::WeightedRoundRobin { weights } => {
            Box::new(WeightedRoundRobin::new(weights.clone()))
        }
        PolicyConfig::First => Box::new(First),
        PolicyConfig::IpHash => Box::new(IpHash),
        PolicyConfig::ClientIpHash => Box::new(ClientIpHash),
        PolicyConfig::UriHash => Box::new(UriHash),
        PolicyConfig::Query { key, fallback } => Box::new(QueryHash::new(
            key.clone(),
            from_fallback(fallback.as_ref().cloned().unwrap_or_default()),
        )),
        PolicyConfig::Header { field, fallback } => Box::new(HeaderHash::new(
            field.clone(),
            from_fallback(fallback.as_ref().cloned().unwrap_or_default()),
        )),
        PolicyConfig::Cookie {
            name,
            secret,
            max_age_secs,
            fallback,
        } => Box::new(CookieHash::new(
            name.clone().unwrap_or_else(|| "lb".to_string()),
            secret.clone().unwrap_or_default(),
            *max_age_secs,
            from_fallback(fallback.as_ref().cloned().unwrap_or_default()),
        )),
    }
}

/// Build a fallback policy. Fallbacks are a structural subset of the
/// full policy set, so this can never recurse.
pub fn from_fallback(cfg: FallbackConfig) -> Box<dyn Policy> {
    match cfg {
        FallbackConfig::Random => Box::new(Random),
        FallbackConfig::RandomChoose { choose } => Box::new(RandomChoose::new(choose.unwrap_or(2))),
        FallbackConfig::LeastConn => Box::new(LeastConn),
        FallbackConfig::RoundRobin => Box::new(RoundRobin::new()),
        FallbackConfig::WeightedRoundRobin { weights } => {
            Box::new(WeightedRoundRobin::new(weights))
        }
        FallbackConfig::First => Box::new(First),
        FallbackConfig::IpHash => Box::new(IpHash),
        FallbackConfig::ClientIpHash => Box::new(ClientIpHash),
        FallbackConfig::UriHash => Box::new(UriHash),
    }
}
