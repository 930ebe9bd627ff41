//! Upstream pool and health registry.
//!
//! # Responsibilities
//! - Build the ordered pool of hosts from configuration
//! - Register hosts in an injected, address-keyed registry
//! - Produce the read-only health snapshot for the admin API

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use super::host::Host;

/// Insertion-ordered collection of hosts, shared read-only across all
/// in-flight requests. Replaced wholesale on config reload.
#[derive(Debug, Clone, Default)]
pub struct UpstreamPool {
    hosts: Vec<Arc<Host>>,
}

impl UpstreamPool {
    /// Build a pool from dial addresses, registering every host in the
    /// given registry. Pool order follows the configured order.
    ///
    /// Registry entries for addresses that survive a reload are reused
    /// so their counters carry over; entries for addresses dropped from
    /// the configuration are removed.
    pub fn provision<'a, I>(dials: I, max_requests: usize, registry: &HostRegistry) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let hosts: Vec<Arc<Host>> = dials
            .into_iter()
            .map(|dial| {
                registry
                    .entry(dial.to_string())
                    .and_modify(|host| host.set_max_requests(max_requests))
                    .or_insert_with(|| Arc::new(Host::new(dial, max_requests)))
                    .clone()
            })
            .collect();
        registry.retain(|addr, _| hosts.iter().any(|h| h.dial() == addr));
        Self { hosts }
    }

    /// The hosts in pool order.
    pub fn hosts(&self) -> &[Arc<Host>] {
        &self.hosts
    }
}

/// Address-keyed registry of every provisioned host.
///
/// Explicitly owned and injected into both pool construction and the
/// admin snapshot endpoint, so pool health can be queried without any
/// process-wide global.
pub type HostRegistry = DashMap<String, Arc<Host>>;

/// One row of the admin health snapshot.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UpstreamStatus {
    pub address: String,
    pub num_requests: usize,
    pub fails: usize,
}

/// Snapshot the registry as an address-ordered list.
///
/// Counters may move concurrently while iterating; the snapshot is
/// eventually consistent, not transactional.
pub fn snapshot(registry: &HostRegistry) -> Vec<UpstreamStatus> {
    let mut results: Vec<UpstreamStatus> = registry
        .iter()
        .map(|entry| UpstreamStatus {
            address: entry.key().clone(),
            num_requests: entry.value().num_requests(),
            fails: entry.value().fails(),
        })
        .collect();
    results.sort_by(|a, b| a.address.cmp(&b.address));
    results
}
