use serde::{Deserialize, Serialize};

use crate::devices::BatteryModel;
use crate::sim::schedule::{ScheduleError, WeekSchedule};

use super::W_TO_KW;
use super::constraints::{self, ConstraintContext};
use super::core::DispatchPolicy;
use super::power_flow::PowerFlow;
use super::types::{DispatchConfig, StepInput};

/// What the battery may do while a schedule period is active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchProfile {
    /// May charge from PV.
    pub can_charge: bool,
    /// May discharge.
    pub can_discharge: bool,
    /// May charge from the grid.
    pub can_grid_charge: bool,
    /// Share of the cyclable energy that may be discharged in one step (%).
    pub discharge_percent: f64,
    /// Share of the cyclable energy that may be grid-charged in one step (%).
    pub grid_charge_percent: f64,
}

impl Default for DispatchProfile {
    fn default() -> Self {
        Self {
            can_charge: true,
            can_discharge: false,
            can_grid_charge: false,
            discharge_percent: 100.0,
            grid_charge_percent: 100.0,
        }
    }
}

impl DispatchProfile {
    /// Charge percentage implied by the permissions: the grid-charge
    /// percentage when grid charging is on, otherwise 100 for PV charging.
    pub fn charge_percent(&self) -> f64 {
        if self.can_grid_charge {
            self.grid_charge_percent
        } else if self.can_charge {
            100.0
        } else {
            0.0
        }
    }

    /// Discharge percentage, zero when discharging is off.
    pub fn discharge_percent(&self) -> f64 {
        if self.can_discharge { self.discharge_percent } else { 0.0 }
    }
}

/// Schedule-driven dispatch.
///
/// Each hour maps to a 1-based profile id through weekday/weekend month-by-hour
/// matrices. The active profile sets the charge permissions and caps the
/// desired power at a share of the battery's cyclable energy.
#[derive(Debug, Clone)]
pub struct ManualPolicy {
    schedule: WeekSchedule,
    profiles: Vec<DispatchProfile>,
    active: DispatchProfile,
}

impl ManualPolicy {
    /// Creates a manual policy.
    ///
    /// # Errors
    ///
    /// Returns a [`ScheduleError`] if the schedule names a profile that does
    /// not exist.
    pub fn new(
        schedule: WeekSchedule,
        profiles: Vec<DispatchProfile>,
    ) -> Result<Self, ScheduleError> {
        schedule.check_periods(profiles.len())?;
        Ok(Self {
            schedule,
            profiles,
            active: DispatchProfile::default(),
        })
    }

    /// Profile in effect at an hour of the year.
    pub fn profile_at(&self, hour_of_year: usize) -> &DispatchProfile {
        &self.profiles[self.schedule.period_at(hour_of_year) - 1]
    }

    /// Profile applied to the last step.
    pub fn active_profile(&self) -> &DispatchProfile {
        &self.active
    }
}

/// Maximum energy the battery can cycle between the SOC bounds (kWh).
pub fn max_cycle_energy<B: BatteryModel>(battery: &B, config: &DispatchConfig) -> f64 {
    battery.voltage()
        * battery.charge_maximum()
        * W_TO_KW
        * 0.01
        * (config.soc_max - config.soc_min)
}

impl DispatchPolicy for ManualPolicy {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn compute_desired_power<B: BatteryModel, F: PowerFlow>(
        &mut self,
        input: &StepInput,
        config: &DispatchConfig,
        battery: &B,
        power_flow: &mut F,
    ) -> f64 {
        self.active = *self.profile_at(input.hour_of_year);
        let profile = self.active;

        let state = power_flow.state_mut();
        state.can_discharge = profile.can_discharge;
        state.can_pv_charge = profile.can_charge;
        state.can_grid_charge = profile.can_grid_charge;
        state.can_clip_charge = false;
        power_flow.initialize();

        let dt = config.dt_hours;
        let e_max = max_cycle_energy(battery, config);
        let mut power = power_flow.state().battery_kw;

        if power > 0.0 {
            let e_percent = e_max * profile.discharge_percent() * 0.01;
            power = power.min(e_max / dt).min(e_percent / dt);
        } else if power < 0.0 {
            let e_percent = e_max * profile.charge_percent() * 0.01;
            power = power.max(-e_max / dt).max(-e_percent / dt);
        }
        power
    }

    fn check_constraints(&self, ctx: &ConstraintContext<'_>, current: &mut f64) -> bool {
        constraints::check_manual(ctx, current, self.active.can_charge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::SimpleBattery;
    use crate::dispatch::power_flow::BatteryPowerFlow;
    use crate::sim::schedule::MonthHourSchedule;
    use approx::assert_abs_diff_eq;

    fn discharge_profile(percent: f64) -> DispatchProfile {
        DispatchProfile {
            can_charge: false,
            can_discharge: true,
            can_grid_charge: false,
            discharge_percent: percent,
            grid_charge_percent: 0.0,
        }
    }

    fn loaded_flow(pv: f64, load: f64, config: &DispatchConfig) -> BatteryPowerFlow {
        let mut flow = BatteryPowerFlow::default();
        let s = flow.state_mut();
        s.set_inputs(pv, 0.0, load);
        s.battery_charge_max_kw = config.power_charge_max;
        s.battery_discharge_max_kw = config.power_discharge_max;
        flow
    }

    #[test]
    fn percentages_follow_permissions() {
        let mut p = DispatchProfile::default();
        assert_eq!(p.charge_percent(), 100.0);
        assert_eq!(p.discharge_percent(), 0.0);
        p.can_grid_charge = true;
        p.grid_charge_percent = 40.0;
        assert_eq!(p.charge_percent(), 40.0);
        p.can_discharge = true;
        p.discharge_percent = 25.0;
        assert_eq!(p.discharge_percent(), 25.0);
    }

    #[test]
    fn rejects_missing_profile() {
        let schedule = WeekSchedule::same_every_day(MonthHourSchedule::uniform(3));
        let err = ManualPolicy::new(schedule, vec![DispatchProfile::default(); 2]).unwrap_err();
        assert!(matches!(err, ScheduleError::PeriodOutOfRange { period: 3, .. }));
    }

    #[test]
    fn weekday_and_weekend_profiles() {
        let schedule = WeekSchedule {
            weekday: MonthHourSchedule::uniform(1),
            weekend: MonthHourSchedule::uniform(2),
        };
        let profiles = vec![DispatchProfile::default(), discharge_profile(50.0)];
        let policy = ManualPolicy::new(schedule, profiles).unwrap();
        assert!(!policy.profile_at(0).can_discharge);
        // day 5 of the year is a weekend day
        assert!(policy.profile_at(5 * 24 + 3).can_discharge);
    }

    #[test]
    fn discharge_capped_at_half_of_cycle_energy() {
        // 125 Ah at 100 V across an 80% window cycles 10 kWh
        let config = DispatchConfig {
            soc_min: 10.0,
            soc_max: 90.0,
            power_discharge_max: 20.0,
            ..DispatchConfig::default()
        };
        let battery = SimpleBattery::new(125.0, 100.0, 80.0, 1.0);
        assert_abs_diff_eq!(max_cycle_energy(&battery, &config), 10.0, epsilon = 1e-9);

        let schedule = WeekSchedule::same_every_day(MonthHourSchedule::uniform(1));
        let mut policy = ManualPolicy::new(schedule, vec![discharge_profile(50.0)]).unwrap();
        let mut flow = loaded_flow(0.0, 30.0, &config);
        let desired =
            policy.compute_desired_power(&StepInput::default(), &config, &battery, &mut flow);
        assert_abs_diff_eq!(desired, 5.0, epsilon = 1e-9);
        assert!(flow.state().can_discharge);
        assert!(!flow.state().can_pv_charge);
    }

    #[test]
    fn grid_charge_capped_by_percent() {
        let config = DispatchConfig {
            soc_min: 10.0,
            soc_max: 90.0,
            power_charge_max: 20.0,
            ..DispatchConfig::default()
        };
        let battery = SimpleBattery::new(125.0, 100.0, 20.0, 1.0);
        let profile = DispatchProfile {
            can_grid_charge: true,
            grid_charge_percent: 30.0,
            ..DispatchProfile::default()
        };
        let schedule = WeekSchedule::same_every_day(MonthHourSchedule::uniform(1));
        let mut policy = ManualPolicy::new(schedule, vec![profile]).unwrap();
        let mut flow = loaded_flow(0.0, 1.0, &config);
        let desired =
            policy.compute_desired_power(&StepInput::default(), &config, &battery, &mut flow);
        assert_abs_diff_eq!(desired, -3.0, epsilon = 1e-9);
    }

    #[test]
    fn idle_profile_asks_for_nothing() {
        let config = DispatchConfig::default();
        let battery = SimpleBattery::new(100.0, 100.0, 50.0, 1.0);
        let profile = DispatchProfile {
            can_charge: false,
            ..DispatchProfile::default()
        };
        let schedule = WeekSchedule::same_every_day(MonthHourSchedule::uniform(1));
        let mut policy = ManualPolicy::new(schedule, vec![profile]).unwrap();
        let mut flow = loaded_flow(3.0, 1.0, &config);
        let desired =
            policy.compute_desired_power(&StepInput::default(), &config, &battery, &mut flow);
        assert_eq!(desired, 0.0);
    }
}
