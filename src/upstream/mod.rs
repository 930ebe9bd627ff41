//! Upstream host tracking.
//!
//! # Data Flow
//! ```text
//! config upstreams
//!     → pool.rs (build Vec<Arc<Host>>, register in HostRegistry)
//!     → selection policies read the pool per request
//!     → host.rs guard increments/decrements active requests
//!     → admin snapshot reads the registry
//! ```
//!
//! # Design Decisions
//! - Counters are atomics; no mutex on the request hot path
//! - The pool is immutable after provisioning; config reload swaps the
//!   whole pool reference, never edits it in place
//! - Host identity is the dial address

pub mod host;
pub mod pool;

pub use host::{ActiveRequestGuard, Host};
pub use pool::{snapshot, HostRegistry, UpstreamPool, UpstreamStatus};
