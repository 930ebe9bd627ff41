//! Round-robin selection, plain and weighted.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use http::HeaderMap;

use crate::http::request::RequestContext;
use crate::upstream::Host;

use super::Policy;

/// Cycles through the pool with a shared atomic cursor.
///
/// The cursor advances on every probe, including probes that land on
/// an unavailable host, so concurrent requests fan out instead of
/// piling onto the next available slot.
#[derive(Debug, Default)]
pub struct RoundRobin {
    robin: AtomicU32,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for RoundRobin {
    fn select(
        &self,
        pool: &[Arc<Host>],
        _req: &RequestContext<'_>,
        _resp: Option<&mut HeaderMap>,
    ) -> Option<Arc<Host>> {
        let n = pool.len() as u32;
        if n == 0 {
            return None;
        }
        for _ in 0..n {
            let robin = self.robin.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            let host = &pool[(robin % n) as usize];
            if host.available() {
                return Some(Arc::clone(host));
            }
        }
        None
    }
}

/// Weighted round-robin over the configured upstream order.
///
/// A shared cursor walks the weight buckets; the chosen bucket index
/// is then mapped onto the currently-available hosts, so removing a
/// host shifts assignments rather than stalling the cursor.
#[derive(Debug)]
pub struct WeightedRoundRobin {
    weights: Vec<u32>,
    total_weight: u32,
    index: AtomicU32,
}

impl WeightedRoundRobin {
    pub fn new(weights: Vec<u32>) -> Self {
        let total_weight = weights.iter().sum::<u32>().max(1);
        Self {
            weights,
            total_weight,
            index: AtomicU32::new(0),
        }
    }
}

impl Policy for WeightedRoundRobin {
    fn select(
        &self,
        pool: &[Arc<Host>],
        _req: &RequestContext<'_>,
        _resp: Option<&mut HeaderMap>,
    ) -> Option<Arc<Host>> {
        if pool.is_empty() {
            return None;
        }
        if self.weights.len() < 2 {
            return pool.first().map(Arc::clone);
        }

        let current = self.index.fetch_add(1, Ordering::Relaxed).wrapping_add(1) % self.total_weight;
        let mut index = 0;
        let mut cumulative = 0;
        for (i, weight) in self.weights.iter().enumerate() {
            cumulative += weight;
            if current < cumulative {
                index = i;
                break;
            }
        }

        let available: Vec<&Arc<Host>> = pool.iter().filter(|h| h.available()).collect();
        if available.is_empty() {
            return None;
        }
        Some(Arc::clone(available[index % available.len()]))
    }
}
