use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::devices::BatteryModel;
use crate::sim::clock::{HOURS_PER_DAY, HOURS_PER_YEAR, hour_of_day, month_of_hour};

use super::constraints::{self, ConstraintContext};
use super::core::DispatchPolicy;
use super::manual::max_cycle_energy;
use super::power_flow::PowerFlow;
use super::types::{ChargePermissions, DispatchConfig, StepInput};

/// Margin added to a freshly computed target to cover voltage-dependent losses.
pub const SAFETY_FACTOR: f64 = 0.03;

/// How the automatic policies obtain their battery power profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomaticMode {
    /// Shave peaks using a perfect forecast of the coming day.
    #[default]
    PeakShaving,
    /// Shave peaks using the previous day's actuals as the forecast.
    PeakShavingLookBehind,
    /// Follow an externally supplied battery power series.
    Custom,
}

/// Behind-the-meter automatic dispatch.
///
/// Once per simulated day the policy sorts the forecast grid demand of the
/// next 24 hours and picks the lowest flat target the battery can hold with
/// one cycle of energy. The per-step desired power is the forecast demand
/// minus that target. Targets only ratchet upward within a calendar month.
#[derive(Debug, Clone)]
pub struct PeakShavingPolicy {
    mode: AutomaticMode,
    permissions: ChargePermissions,
    steps_per_hour: usize,
    pv_forecast: Vec<f64>,
    load_forecast: Vec<f64>,
    target_input: Vec<f64>,
    custom: Vec<f64>,
    grid: Vec<f64>,
    target_use: Vec<f64>,
    battery_use: Vec<f64>,
    target_month: f64,
    month: Option<u32>,
    last_update: Option<usize>,
    target_current: f64,
    battery_current: f64,
}

impl PeakShavingPolicy {
    pub fn new(mode: AutomaticMode, permissions: ChargePermissions, steps_per_hour: usize) -> Self {
        let steps_per_hour = steps_per_hour.max(1);
        Self {
            mode,
            permissions,
            steps_per_hour,
            pv_forecast: Vec::new(),
            load_forecast: Vec::new(),
            target_input: Vec::new(),
            custom: Vec::new(),
            grid: Vec::new(),
            target_use: Vec::new(),
            battery_use: Vec::new(),
            target_month: f64::NEG_INFINITY,
            month: None,
            last_update: None,
            target_current: 0.0,
            battery_current: 0.0,
        }
    }

    pub fn mode(&self) -> AutomaticMode {
        self.mode
    }

    /// Installs the PV forecast, one value per substep (kW).
    pub fn set_pv_forecast(&mut self, pv_kw: Vec<f64>) {
        self.pv_forecast = pv_kw;
    }

    /// Installs the load forecast, one value per substep (kW).
    pub fn set_load_forecast(&mut self, load_kw: Vec<f64>) {
        self.load_forecast = load_kw;
    }

    /// Installs a battery power series for [`AutomaticMode::Custom`] (kW).
    pub fn set_custom_dispatch(&mut self, battery_kw: Vec<f64>) {
        self.custom = battery_kw;
    }

    /// Installs target grid power per substep (kW). Negative entries mean
    /// no target is supplied for that day.
    pub fn set_target_power(&mut self, target_kw: Vec<f64>) {
        self.target_input = target_kw;
    }

    /// Target grid power in effect for the last step (kW).
    pub fn target_power_kw(&self) -> f64 {
        self.target_current
    }

    /// Highest target established this month, `-inf` right after a reset.
    pub fn monthly_target_kw(&self) -> f64 {
        self.target_month
    }

    fn steps_per_day(&self) -> usize {
        HOURS_PER_DAY * self.steps_per_hour
    }

    fn forecast_at(series: &[f64], idx: usize) -> f64 {
        if series.is_empty() { 0.0 } else { series[idx % series.len()] }
    }

    /// Recomputes the day's target and battery profile starting at substep
    /// `day_start`.
    fn update_day<B: BatteryModel>(
        &mut self,
        hour_of_year: usize,
        day_start: usize,
        config: &DispatchConfig,
        battery: &B,
    ) {
        let month = month_of_hour(hour_of_year);
        if self.month != Some(month) {
            self.month = Some(month);
            self.target_month = f64::NEG_INFINITY;
        }
        self.last_update = Some(day_start);

        let n = self.steps_per_day();
        self.grid = (0..n)
            .map(|i| {
                Self::forecast_at(&self.load_forecast, day_start + i)
                    - Self::forecast_at(&self.pv_forecast, day_start + i)
            })
            .collect();
        let mut sorted = self.grid.clone();
        sorted.sort_by(|a, b| b.total_cmp(a));

        let e_max = max_cycle_energy(battery, config);
        let target = self.target_power(&sorted, e_max, config.dt_hours, day_start);
        self.target_use = target;
        self.battery_use = self
            .grid
            .iter()
            .zip(&self.target_use)
            .map(|(grid, target)| grid - target)
            .collect();

        debug!(
            hour_of_year,
            e_max,
            peak_kw = sorted.first().copied().unwrap_or(0.0),
            target_kw = self.target_use.first().copied().unwrap_or(0.0),
            monthly_target_kw = self.target_month,
            "peak shaving target updated"
        );
    }

    fn target_power(&mut self, sorted: &[f64], e_max: f64, dt: f64, day_start: usize) -> Vec<f64> {
        let n = sorted.len();

        if self.target_input.len() >= day_start + n && self.target_input[day_start] >= 0.0 {
            return self.target_input[day_start..day_start + n].to_vec();
        }
        if sorted[0] < self.target_month {
            return vec![self.target_month; n];
        }

        let e_charge = recharge_energy(sorted, dt);
        let mut p_target = sorted[0];
        let mut sum = 0.0;
        for ii in 0..n - 1 {
            if sorted[ii + 1] < 0.0 {
                break;
            }
            p_target = sorted[ii + 1];

            let diff = sorted[ii] - sorted[ii + 1];
            if diff == 0.0 {
                continue;
            }
            sum += diff * (ii + 1) as f64 * dt;

            if sum <= e_max.min(e_charge[ii + 1]) {
                continue;
            }
            // Inside this segment shaved energy falls and recharge room grows
            // linearly with the target; take the lowest target meeting both.
            let shave_slope = (ii + 1) as f64 * dt;
            let room_slope = (n - ii - 1) as f64 * dt;
            let by_energy = (sum - e_max) / shave_slope;
            let by_room = (sum - e_charge[ii + 1]) / (shave_slope + room_slope);
            p_target += by_energy.max(by_room).max(0.0);
            break;
        }

        p_target *= 1.0 + SAFETY_FACTOR;
        if p_target < self.target_month {
            p_target = self.target_month;
        } else {
            self.target_month = p_target;
        }
        vec![p_target; n]
    }
}

/// For each threshold in a descending series, the energy (kWh) needed to
/// raise every lower substep up to that threshold.
///
/// Bounds how deep a target may go: the battery must be able to recharge
/// what it shaves from the substeps below the target.
fn recharge_energy(sorted: &[f64], dt: f64) -> Vec<f64> {
    sorted
        .iter()
        .map(|&threshold| {
            sorted
                .iter()
                .rev()
                .take_while(|&&g| g <= threshold)
                .map(|g| (threshold - g) * dt)
                .sum()
        })
        .collect()
}

impl DispatchPolicy for PeakShavingPolicy {
    fn name(&self) -> &'static str {
        "peak_shaving"
    }

    fn compute_desired_power<B: BatteryModel, F: PowerFlow>(
        &mut self,
        input: &StepInput,
        config: &DispatchConfig,
        battery: &B,
        power_flow: &mut F,
    ) -> f64 {
        let state = power_flow.state_mut();
        state.can_pv_charge = self.permissions.can_charge;
        state.can_clip_charge = self.permissions.can_clip_charge;
        state.can_grid_charge = self.permissions.can_grid_charge;
        state.can_discharge = true;

        let idx = input.index(self.steps_per_hour);
        if self.mode == AutomaticMode::Custom {
            // wraps for runs longer than one year
            let year_steps = HOURS_PER_YEAR * self.steps_per_hour;
            self.battery_current = Self::forecast_at(&self.custom, idx % year_steps);
        } else {
            let day_index = hour_of_day(input.hour_of_year) * self.steps_per_hour + input.step;
            let day_start = idx - day_index;
            let new_day = day_index == 0 && self.last_update != Some(day_start);
            if new_day || self.battery_use.is_empty() {
                self.update_day(input.hour_of_year, day_start, config, battery);
            }
            self.target_current = self.target_use[day_index];
            self.battery_current = self.battery_use[day_index];
        }

        input.desired_battery_kw.unwrap_or(self.battery_current)
    }

    fn check_constraints(&self, ctx: &ConstraintContext<'_>, current: &mut f64) -> bool {
        constraints::check_automatic(ctx, current, self.permissions)
    }
}
