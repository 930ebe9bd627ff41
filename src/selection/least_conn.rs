//! Least-connections selection.

use std::sync::Arc;

use http::HeaderMap;

use crate::http::request::RequestContext;
use crate::upstream::Host;

use super::Policy;

/// Selects the available host with the fewest active requests.
///
/// Hosts tied at the minimum are chosen among uniformly, via reservoir
/// sampling over the tie set, so a cluster of idle hosts shares load
/// instead of hammering the first one.
#[derive(Debug, Default)]
pub struct LeastConn;

impl Policy for LeastConn {
    fn select(
        &self,
        pool: &[Arc<Host>],
        _req: &RequestContext<'_>,
        _resp: Option<&mut HeaderMap>,
    ) -> Option<Arc<Host>> {
        let mut best: Option<&Arc<Host>> = None;
        let mut least = usize::MAX;
        let mut count = 0usize;
        for host in pool {
            if !host.available() {
                continue;
            }
            let reqs = host.num_requests();
            if reqs < least {
                least = reqs;
                count = 1;
                best = Some(host);
            } else if reqs == least {
                count += 1;
                if fastrand::usize(0..count) == 0 {
                    best = Some(host);
                }
            }
        }
        best.map(Arc::clone)
    }
}
