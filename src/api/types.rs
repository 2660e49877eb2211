//! API response and query types.

use serde::{Deserialize, Serialize};

use crate::dispatch::{BatteryMetrics, DispatchConfig};
use crate::sim::kpi::KpiReport;
use crate::sim::types::{SimConfig, StepResult};

/// Combined state response.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub config: SimConfig,
    pub dispatch: DispatchConfig,
    pub policy: String,
    pub kpi: KpiReport,
    pub metrics: BatteryMetrics,
    /// Last step of the run, `null` for an empty run.
    pub latest_step: Option<StepResult>,
}

/// Optional range query parameters for the telemetry endpoint.
#[derive(Debug, Deserialize)]
pub struct TelemetryQuery {
    /// Start timestep (inclusive).
    pub from: Option<usize>,
    /// End timestep (inclusive).
    pub to: Option<usize>,
}

/// Error response body for 400-class errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
