//! HTTP server, request context, and proxy handler.

pub mod request;
pub mod server;

pub use request::RequestContext;
pub use server::{AppState, HttpServer, ProxyState};
