//! Request-scoped error types.
//!
//! Selection failure ("no upstream available") is deliberately *not* an
//! error value inside the engine: selectors return `Option<Arc<Host>>`
//! and the proxy handler maps `None` to a 502. `ProxyError` covers the
//! conditions that arise after a host was selected.

use axum::http::StatusCode;

/// Errors surfaced while proxying a single request.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// A response-route handler that only makes sense inside a diverted
    /// response pipeline was invoked outside of one. This is invalid
    /// configuration composition, not a programming bug.
    #[error("cannot use '{0}' outside of a handle_response route")]
    MisplacedHandler(&'static str),

    /// A status-code override expanded to something unparsable.
    #[error("invalid status code override: {0:?}")]
    StatusOverride(String),
}

impl ProxyError {
    /// The status the client sees when this error terminates a request.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MisplacedHandler(_) | ProxyError::StatusOverride(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
