//! Reverse proxy with pluggable upstream selection and response
//! interception.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌───────────────────────────────────────────┐
//!                       │               RELAY PROXY                 │
//!                       │                                           │
//!   Client Request      │  ┌────────┐   ┌───────────┐   ┌────────┐  │
//!   ────────────────────┼─▶│  http  │──▶│ selection │──▶│upstream│  │
//!                       │  │ server │   │ policies  │   │  pool  │  │
//!                       │  └────────┘   └───────────┘   └───┬────┘  │
//!                       │                                   │       │
//!                       │                                   ▼       │
//!   Client Response     │  ┌─────────┐   ┌─────────┐   ┌────────┐   │
//!   ◀───────────────────┼──│intercept│◀──│streaming│◀──│backend │◀──┼── Backend
//!                       │  └─────────┘   └─────────┘   └────────┘   │
//!                       │                                           │
//!                       │  ┌─────────────────────────────────────┐  │
//!                       │  │        Cross-Cutting Concerns       │  │
//!                       │  │  ┌────────┐ ┌───────┐ ┌──────────┐  │  │
//!                       │  │  │ config │ │ admin │ │observa-  │  │  │
//!                       │  │  │+reload │ │  API  │ │ bility   │  │  │
//!                       │  │  └────────┘ └───────┘ └──────────┘  │  │
//!                       │  └─────────────────────────────────────┘  │
//!                       └───────────────────────────────────────────┘
//! ```
//!
//! Control flow per request: the selection policy reads the upstream
//! pool (filtered by availability) and returns one host; the proxy
//! handler dials it, holding an active-request guard around the call;
//! on response, the interceptor inspects status and headers and either
//! streams through, rewrites the status, or diverts the buffered
//! response into a configured route sub-pipeline.

// Core subsystems
pub mod config;
pub mod http;
pub mod intercept;
pub mod selection;
pub mod streaming;
pub mod upstream;

// Cross-cutting concerns
pub mod admin;
pub mod error;
pub mod observability;
