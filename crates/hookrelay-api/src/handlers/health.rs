//! Health check handlers for service monitoring.
//!
//! `/health` reports the worker pool and routing state and answers `503`
//! once the pool stops accepting work, so load balancers drain the instance
//! during shutdown. `/live` only proves the HTTP server responds.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use hookrelay_dispatch::PoolState;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::AppState;

/// Health check response structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Timestamp when health check was performed
    pub timestamp: DateTime<Utc>,
    /// Worker pool state
    pub pool: PoolHealth,
    /// Projects with a provider application
    pub routed_projects: Vec<String>,
    /// Service version information
    pub version: String,
}

/// Overall health status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Accepting and relaying events
    Healthy,
    /// Draining or stopped
    Unhealthy,
}

/// Worker pool section of the health report.
#[derive(Debug, Serialize, Deserialize)]
pub struct PoolHealth {
    /// Lifecycle state
    pub state: PoolState,
    /// Configured worker count
    pub max_workers: usize,
    /// Tasks executing right now
    pub in_flight: usize,
}

/// Health check endpoint handler.
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let pool_state = state.pool.state();
    let status = match pool_state {
        PoolState::Running => HealthStatus::Healthy,
        PoolState::Draining | PoolState::Stopped => HealthStatus::Unhealthy,
    };

    let response = HealthResponse {
        status,
        timestamp: state.clock.now_utc(),
        pool: PoolHealth {
            state: pool_state,
            max_workers: state.pool.max_workers(),
            in_flight: state.pool.in_flight(),
        },
        routed_projects: state.routes.projects().into_iter().map(str::to_string).collect(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    debug!(status = ?response.status, pool_state = %pool_state, "Health check completed");

    let status_code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response)).into_response()
}

/// Liveness check endpoint for orchestrator restarts.
///
/// Does not look at the pool or the provider.
#[instrument(name = "liveness_check", skip(state))]
pub async fn liveness_check(State(state): State<AppState>) -> Response {
    debug!("Performing liveness check");

    let response = serde_json::json!({
        "status": "alive",
        "timestamp": state.clock.now_utc(),
        "service": "hookrelay"
    });

    (StatusCode::OK, Json(response)).into_response()
}
