//! Random and random-choose selection.

use std::sync::Arc;

use http::HeaderMap;

use crate::http::request::RequestContext;
use crate::upstream::Host;

use super::Policy;

/// Uniformly random selection among available hosts.
///
/// Uses reservoir sampling so the pool is walked exactly once without
/// first collecting the available hosts.
#[derive(Debug, Default)]
pub struct Random;

impl Policy for Random {
    fn select(
        &self,
        pool: &[Arc<Host>],
        _req: &RequestContext<'_>,
        _resp: Option<&mut HeaderMap>,
    ) -> Option<Arc<Host>> {
        let mut picked = None;
        let mut count = 0usize;
        for host in pool {
            if !host.available() {
                continue;
            }
            count += 1;
            if fastrand::usize(0..count) == 0 {
                picked = Some(Arc::clone(host));
            }
        }
        picked
    }
}

/// Power-of-k-choices selection: sample `choose` hosts positionally,
/// then take the least loaded of the sample.
///
/// The positional sample is approximate when hosts drop out mid-walk;
/// the distributional behavior is what matters.
#[derive(Debug)]
pub struct RandomChoose {
    choose: usize,
}

impl RandomChoose {
    pub fn new(choose: usize) -> Self {
        Self { choose }
    }
}

impl Policy for RandomChoose {
    fn select(
        &self,
        pool: &[Arc<Host>],
        _req: &RequestContext<'_>,
        _resp: Option<&mut HeaderMap>,
    ) -> Option<Arc<Host>> {
        let k = self.choose.min(pool.len());
        let mut choices: Vec<Option<&Arc<Host>>> = vec![None; k];
        let mut i = 0usize;
        for host in pool {
            if !host.available() {
                continue;
            }
            let j = fastrand::usize(0..i + 1);
            if j < k {
                choices[j] = Some(host);
            }
            i += 1;
        }
        least_requests(choices.into_iter().flatten())
    }
}

/// The entry with the fewest active requests; ties keep the later
/// entry.
pub(crate) fn least_requests<'a, I>(hosts: I) -> Option<Arc<Host>>
where
    I: IntoIterator<Item = &'a Arc<Host>>,
{
    let mut best: Option<&Arc<Host>> = None;
    let mut best_reqs = usize::MAX;
    for host in hosts {
        let reqs = host.num_requests();
        if reqs == 0 {
            return Some(Arc::clone(host));
        }
        if reqs <= best_reqs {
            best_reqs = reqs;
            best = Some(host);
        }
    }
    best.map(Arc::clone)
}
