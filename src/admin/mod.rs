//! Admin API: read-only observability endpoints.
//!
//! Routes are registered with `get` only; any other method gets a 405
//! from the router.

pub mod handlers;

use axum::{routing::get, Router};

use crate::http::server::AppState;

use self::handlers::{get_status, get_upstreams};

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/upstreams", get(get_upstreams))
        .with_state(state)
}
