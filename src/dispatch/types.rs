//! Configuration and per-step input types shared by every dispatch policy.

use serde::{Deserialize, Serialize};

use crate::sim::clock::step_index;

/// Default cap on battery runs per timestep.
///
/// Every constraint in the enforcement layer shrinks the trial current
/// monotonically, and five runs is enough for the combined set to settle.
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Which electrical limits the constraint layer enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionMode {
    /// Clamp current only.
    Current,
    /// Clamp power only.
    Power,
    /// Clamp both current and power.
    Both,
}

impl RestrictionMode {
    /// Whether current limits apply.
    pub fn limits_current(self) -> bool {
        matches!(self, Self::Current | Self::Both)
    }

    /// Whether power limits apply.
    pub fn limits_power(self) -> bool {
        matches!(self, Self::Power | Self::Both)
    }
}

/// Which side of the utility meter the battery sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterPosition {
    /// Customer side; battery export to the grid is curtailed.
    BehindTheMeter,
    /// Utility side; the battery may export freely.
    FrontOfMeter,
}

/// Charge permissions for the automatic policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargePermissions {
    /// Battery may charge from PV.
    pub can_charge: bool,
    /// Battery may charge from clipped PV.
    pub can_clip_charge: bool,
    /// Battery may charge from the grid.
    pub can_grid_charge: bool,
}

impl Default for ChargePermissions {
    fn default() -> Self {
        Self {
            can_charge: true,
            can_clip_charge: false,
            can_grid_charge: false,
        }
    }
}

/// Immutable dispatch limits for one simulation run.
///
/// SOC bounds are percentages. Current limits are magnitudes in amps and
/// power limits are magnitudes in kW.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchConfig {
    /// Timestep length in hours.
    pub dt_hours: f64,
    /// Minimum SOC (%).
    pub soc_min: f64,
    /// Maximum SOC (%).
    pub soc_max: f64,
    /// Which limits are enforced.
    pub restriction: RestrictionMode,
    /// Maximum charging current (A).
    pub current_charge_max: f64,
    /// Maximum discharging current (A).
    pub current_discharge_max: f64,
    /// Maximum charging power (kW).
    pub power_charge_max: f64,
    /// Maximum discharging power (kW).
    pub power_discharge_max: f64,
    /// Minimum minutes in one direction before switching.
    pub min_dwell_minutes: f64,
    /// Battery runs allowed per timestep.
    pub max_iterations: usize,
    /// Meter position of the battery.
    pub meter: MeterPosition,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dt_hours: 1.0,
            soc_min: 10.0,
            soc_max: 95.0,
            restriction: RestrictionMode::Both,
            current_charge_max: 100.0,
            current_discharge_max: 100.0,
            power_charge_max: 5.0,
            power_discharge_max: 5.0,
            min_dwell_minutes: 0.0,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            meter: MeterPosition::BehindTheMeter,
        }
    }
}

impl DispatchConfig {
    /// Substeps per hour implied by the timestep length.
    pub fn steps_per_hour(&self) -> usize {
        ((1.0 / self.dt_hours).round() as usize).max(1)
    }

    /// Whether the battery sits on the utility side of the meter.
    pub fn is_front_of_meter(&self) -> bool {
        self.meter == MeterPosition::FrontOfMeter
    }
}

/// External signals for one dispatch call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepInput {
    /// Zero-based analysis year.
    pub year: usize,
    /// Hour within the year (0-8759).
    pub hour_of_year: usize,
    /// Substep within the hour.
    pub step: usize,
    /// PV output delivered through the inverter (kW).
    pub pv_kw: f64,
    /// PV output lost to inverter clipping (kW).
    pub pv_clipped_kw: f64,
    /// Site load (kW).
    pub load_kw: f64,
    /// Optional override of the policy's desired battery power (kW).
    pub desired_battery_kw: Option<f64>,
}

impl StepInput {
    /// Absolute substep index of this call.
    pub fn index(&self, steps_per_hour: usize) -> usize {
        step_index(self.year, self.hour_of_year, self.step, steps_per_hour)
    }
}
