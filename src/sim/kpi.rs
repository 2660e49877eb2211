//! Post-hoc KPI computation from simulation results.

use std::fmt;

use serde::Serialize;

use super::types::StepResult;

/// Aggregate key performance indicators derived from a complete simulation run.
///
/// Computed post-hoc from `Vec<StepResult>` to ensure consistency between
/// step data and reported metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    /// Peak grid import power (kW, positive).
    pub peak_import_kw: f64,
    /// Peak grid export power (kW, positive magnitude).
    pub peak_export_kw: f64,
    /// Peak import the site would have drawn without the battery (kW).
    pub peak_import_without_battery_kw: f64,
    /// Total battery energy throughput (kWh, sum of |power| * dt).
    pub battery_throughput_kwh: f64,
    /// Battery equivalent full cycles (throughput / 2*capacity).
    pub battery_equivalent_full_cycles: f64,
    /// Lowest SOC reached (%).
    pub soc_min_pct: f64,
    /// Highest SOC reached (%).
    pub soc_max_pct: f64,
    /// Steps whose constraint loop used every allowed battery run.
    pub iteration_cap_hits: usize,
    /// Steps held idle by the minimum dwell.
    pub held_steps: usize,
}

impl KpiReport {
    /// Computes all KPIs from the complete step record vector.
    ///
    /// # Arguments
    ///
    /// * `results` - Complete simulation step results
    /// * `dt_hours` - Timestep duration in hours
    /// * `battery_capacity_kwh` - Battery capacity for cycle calculation
    /// * `max_iterations` - Battery runs allowed per step
    pub fn from_results(
        results: &[StepResult],
        dt_hours: f64,
        battery_capacity_kwh: f64,
        max_iterations: usize,
    ) -> Self {
        if results.is_empty() {
            return Self {
                peak_import_kw: 0.0,
                peak_export_kw: 0.0,
                peak_import_without_battery_kw: 0.0,
                battery_throughput_kwh: 0.0,
                battery_equivalent_full_cycles: 0.0,
                soc_min_pct: 0.0,
                soc_max_pct: 0.0,
                iteration_cap_hits: 0,
                held_steps: 0,
            };
        }

        let mut peak_import = 0.0_f64;
        let mut peak_export = 0.0_f64;
        let mut peak_uncontrolled = 0.0_f64;
        let mut bat_throughput = 0.0;
        let mut soc_min = f64::INFINITY;
        let mut soc_max = f64::NEG_INFINITY;
        let mut cap_hits = 0;
        let mut held = 0;

        for r in results {
            peak_import = peak_import.max(-r.grid_kw);
            peak_export = peak_export.max(r.grid_kw);
            peak_uncontrolled = peak_uncontrolled.max(r.load_kw - r.pv_kw);
            bat_throughput += r.battery_kw.abs() * dt_hours;
            soc_min = soc_min.min(r.soc_pct);
            soc_max = soc_max.max(r.soc_pct);
            if r.iterations >= max_iterations {
                cap_hits += 1;
            }
            if r.held {
                held += 1;
            }
        }

        let cycles = if battery_capacity_kwh > 0.0 {
            bat_throughput / (2.0 * battery_capacity_kwh)
        } else {
            0.0
        };

        Self {
            peak_import_kw: peak_import,
            peak_export_kw: peak_export,
            peak_import_without_battery_kw: peak_uncontrolled,
            battery_throughput_kwh: bat_throughput,
            battery_equivalent_full_cycles: cycles,
            soc_min_pct: soc_min,
            soc_max_pct: soc_max,
            iteration_cap_hits: cap_hits,
            held_steps: held,
        }
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(
            f,
            "Peak import:           {:.2} kW (without battery {:.2} kW)",
            self.peak_import_kw, self.peak_import_without_battery_kw
        )?;
        writeln!(f, "Peak export:           {:.2} kW", self.peak_export_kw)?;
        writeln!(
            f,
            "Battery throughput:    {:.2} kWh ({:.2} equiv. cycles)",
            self.battery_throughput_kwh, self.battery_equivalent_full_cycles
        )?;
        writeln!(
            f,
            "SOC range:             {:.1}% .. {:.1}%",
            self.soc_min_pct, self.soc_max_pct
        )?;
        writeln!(f, "Iteration cap hits:    {}", self.iteration_cap_hits)?;
        write!(f, "Held steps:            {}", self.held_steps)
    }
}
