//! Per-backend host state.
//!
//! # Responsibilities
//! - Represent a single upstream backend
//! - Track active requests (for least-conn and max-request caps)
//! - Track failure count (fed by passive failure observation)
//! - Track health flag (flipped by external health checking)

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A single upstream backend.
///
/// All counters are atomics read and written with relaxed ordering;
/// they are statistics, not synchronization points.
#[derive(Debug)]
pub struct Host {
    /// Dial target (host:port), immutable after provisioning.
    dial: String,
    /// Requests currently in flight to this host.
    num_requests: AtomicUsize,
    /// Accumulated failure count.
    fails: AtomicUsize,
    /// Health flag. True unless marked down.
    healthy: AtomicBool,
    /// Maximum concurrent requests. 0 means unlimited.
    max_requests: AtomicUsize,
}

impl Host {
    /// Create a healthy host for the given dial address.
    pub fn new(dial: impl Into<String>, max_requests: usize) -> Self {
        Self {
            dial: dial.into(),
            num_requests: AtomicUsize::new(0),
            fails: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
            max_requests: AtomicUsize::new(max_requests),
        }
    }

    /// The dial address. Doubles as the host's identity and as the
    /// key component for rendezvous hashing.
    pub fn dial(&self) -> &str {
        &self.dial
    }

    /// Whether this host may receive a new request.
    pub fn available(&self) -> bool {
        let max = self.max_requests.load(Ordering::Relaxed);
        self.healthy() && (max == 0 || self.num_requests() < max)
    }

    /// Update the concurrent-request cap. Called when a reload keeps
    /// the host but changes its configured limit.
    pub fn set_max_requests(&self, max_requests: usize) {
        self.max_requests.store(max_requests, Ordering::Relaxed);
    }

    /// Number of requests currently in flight.
    pub fn num_requests(&self) -> usize {
        self.num_requests.load(Ordering::Relaxed)
    }

    /// Accumulated failure count.
    pub fn fails(&self) -> usize {
        self.fails.load(Ordering::Relaxed)
    }

    /// Current health flag.
    pub fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Flip the health flag. Called by health-checking collaborators;
    /// selectors only ever read it.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    /// Record one failure against this host.
    pub fn count_fail(&self) {
        self.fails.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark a request as dispatched to this host. The returned guard
    /// performs the paired decrement on drop, including on error and
    /// cancellation paths.
    pub fn count_request(self: &Arc<Self>) -> ActiveRequestGuard {
        self.num_requests.fetch_add(1, Ordering::Relaxed);
        ActiveRequestGuard { host: self.clone() }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dial)
    }
}

/// RAII guard for one in-flight request against a host.
#[derive(Debug)]
pub struct ActiveRequestGuard {
    host: Arc<Host>,
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.host.num_requests.fetch_sub(1, Ordering::Relaxed);
    }
}
