//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;
use super::types::{ErrorResponse, StateResponse, TelemetryQuery};
use crate::sim::types::StepResult;

/// Returns run configuration, KPIs, energy metrics and the last step.
///
/// `GET /state` → 200 + `StateResponse` JSON
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    Json(StateResponse {
        config: state.config.clone(),
        dispatch: state.dispatch.clone(),
        policy: state.policy.clone(),
        kpi: state.kpi.clone(),
        metrics: state.metrics.clone(),
        latest_step: state.results.last().cloned(),
    })
}

/// Returns step records, optionally filtered by timestep range.
///
/// `GET /telemetry` → 200 + `Vec<StepResult>` JSON
/// `GET /telemetry?from=N&to=M` → filtered range (inclusive)
/// `GET /telemetry?from=10&to=5` → 400 + `ErrorResponse`
pub async fn get_telemetry(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TelemetryQuery>,
) -> impl IntoResponse {
    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(usize::MAX);

    if from > to {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("`from` ({from}) must be <= `to` ({to})"),
            }),
        ));
    }

    let records: Vec<StepResult> = state
        .results
        .iter()
        .filter(|r| r.timestep >= from && r.timestep <= to)
        .cloned()
        .collect();

    Ok(Json(records))
}
