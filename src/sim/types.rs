//! Core simulation types: run configuration, site input series and step records.

use std::fmt;

use serde::Serialize;

use super::clock::HOURS_PER_DAY;

/// Centralized simulation configuration.
///
/// The engine and the synthetic device models reference this struct for
/// timing parameters, so `dt_hours` is derived in one place.
///
/// # Examples
///
/// ```
/// use battery_dispatch::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(4, 2, 42);
/// assert_eq!(cfg.dt_hours, 0.25);
/// assert_eq!(cfg.total_steps(), 192);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimConfig {
    /// Substeps per simulated hour.
    pub steps_per_hour: usize,
    /// Number of days to simulate.
    pub days: usize,
    /// Duration of one timestep in hours, `1 / steps_per_hour`.
    pub dt_hours: f64,
    /// Master random seed for reproducibility.
    pub seed: u64,
}

impl SimConfig {
    /// Creates a new simulation configuration.
    ///
    /// # Panics
    ///
    /// Panics if `steps_per_hour` or `days` is zero.
    pub fn new(steps_per_hour: usize, days: usize, seed: u64) -> Self {
        assert!(steps_per_hour > 0, "steps_per_hour must be > 0");
        assert!(days > 0, "days must be > 0");
        Self {
            steps_per_hour,
            days,
            dt_hours: 1.0 / steps_per_hour as f64,
            seed,
        }
    }

    /// Timesteps in one simulated day.
    pub fn steps_per_day(&self) -> usize {
        HOURS_PER_DAY * self.steps_per_hour
    }

    /// Total number of simulation steps across all days.
    pub fn total_steps(&self) -> usize {
        self.steps_per_day() * self.days
    }
}

/// PV, clipped PV and load series driving a run, one value per timestep (kW).
///
/// Shorter series wrap around.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteSeries {
    pub pv_kw: Vec<f64>,
    pub clipped_kw: Vec<f64>,
    pub load_kw: Vec<f64>,
}

impl SiteSeries {
    fn at(series: &[f64], t: usize) -> f64 {
        if series.is_empty() { 0.0 } else { series[t % series.len()] }
    }

    /// PV, clipped PV and load at timestep `t`.
    pub fn values_at(&self, t: usize) -> (f64, f64, f64) {
        (
            Self::at(&self.pv_kw, t),
            Self::at(&self.clipped_kw, t),
            Self::at(&self.load_kw, t),
        )
    }
}

/// Complete record of one simulation timestep.
///
/// Power is in kW. Battery power is positive when discharging and grid
/// power is positive when exporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub timestep: usize,
    pub year: usize,
    pub hour_of_year: usize,
    pub step: usize,
    /// Simulation time in hours.
    pub time_hr: f64,
    pub pv_kw: f64,
    pub clipped_kw: f64,
    pub load_kw: f64,
    /// Battery power the policy asked for.
    pub desired_kw: f64,
    /// Battery power after constraint enforcement.
    pub battery_kw: f64,
    /// Battery current (A).
    pub current_a: f64,
    /// SOC after this step (%).
    pub soc_pct: f64,
    pub grid_kw: f64,
    pub pv_to_load_kw: f64,
    pub pv_to_battery_kw: f64,
    pub pv_to_grid_kw: f64,
    pub grid_to_battery_kw: f64,
    pub grid_to_load_kw: f64,
    pub battery_to_load_kw: f64,
    pub battery_to_grid_kw: f64,
    pub charging: bool,
    /// Battery runs used to reconcile this step.
    pub iterations: usize,
    /// Whether the minimum dwell held the battery idle.
    pub held: bool,
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>5} ({:>7.2}h) | pv={:>6.2} clip={:>5.2} load={:>6.2} | \
             bat={:>6.2} kW (want {:>6.2}, SoC={:>5.1}%) grid={:>6.2} kW | iter={}{}",
            self.timestep,
            self.time_hr,
            self.pv_kw,
            self.clipped_kw,
            self.load_kw,
            self.battery_kw,
            self.desired_kw,
            self.soc_pct,
            self.grid_kw,
            self.iterations,
            if self.held { " held" } else { "" },
        )
    }
}
