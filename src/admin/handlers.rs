use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::upstream::{self, UpstreamStatus};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

/// Snapshot of every known host's counters. Eventually consistent:
/// counters keep moving while the snapshot is taken.
pub async fn get_upstreams(State(state): State<AppState>) -> Json<Vec<UpstreamStatus>> {
    Json(upstream::snapshot(&state.registry))
}
