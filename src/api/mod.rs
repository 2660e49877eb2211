//! Read-only REST API over a finished dispatch run.
//!
//! Provides two GET endpoints:
//! - `/state`: run configuration, KPI report, energy metrics and the last step
//! - `/telemetry`: step records with optional range filtering

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::dispatch::{BatteryMetrics, DispatchConfig};
use crate::sim::kpi::KpiReport;
use crate::sim::types::{SimConfig, StepResult};

pub use types::{ErrorResponse, StateResponse, TelemetryQuery};

/// Immutable application state shared across all request handlers.
///
/// Built once after the run completes and wrapped in `Arc`; no locks are
/// needed since all data is read-only.
pub struct AppState {
    /// Simulation timing used for this run.
    pub config: SimConfig,
    /// Dispatch limits used for this run.
    pub dispatch: DispatchConfig,
    /// Name of the dispatch policy.
    pub policy: String,
    /// Aggregate KPI report.
    pub kpi: KpiReport,
    /// Energy and efficiency totals.
    pub metrics: BatteryMetrics,
    /// Per-step simulation results.
    pub results: Vec<StepResult>,
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/telemetry", get(handlers::get_telemetry))
        .with_state(state)
}

/// Binds to the given address and serves the API until the process exits.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
