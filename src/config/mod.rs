//! Configuration loading, validation and hot reload.
//!
//! # Data Flow
//!
//! ```text
//! TOML file -> loader::load_config -> validation::validate_config -> ProxyConfig
//!                                                                        |
//!                                  watcher::ConfigWatcher --------------> AppState::reload
//! ```
//!
//! # Design Decisions
//!
//! - Validation collects every error in a single pass instead of
//!   stopping at the first one, so an operator can fix a file in one
//!   round trip.
//! - A file that fails to parse or validate never reaches the running
//!   proxy; the watcher logs the rejection and keeps the current
//!   configuration.

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, FallbackConfig, HeaderMatchConfig, ListenerConfig, MatchConfig,
    ObservabilityConfig, PolicyConfig, ProxyConfig, ResponseHandlerConfig, RouteConfig,
    TimeoutConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
