//! Per-timestep iteration protocol shared by every dispatch policy.
//!
//! A step runs in five phases:
//!
//! 1. load PV, clipped PV and load into the power-flow state;
//! 2. ask the policy for a desired battery power;
//! 3. hold the battery at zero if the direction flips before the minimum dwell;
//! 4. run the battery with a trial current, recompute the power flow and let
//!    the policy's constraint layer revise the current, rolling the battery
//!    back to its snapshot whenever another run is needed;
//! 5. recompute the power flow once more and remember the direction.

use tracing::{debug, trace};

use crate::devices::BatteryModel;

use super::W_TO_KW;
use super::constraints::{self, BatteryReading, ConstraintContext};
use super::power_flow::{BatteryPowerFlow, PowerFlow, PowerFlowState};
use super::types::{DispatchConfig, StepInput};

/// Minutes-in-mode assumed before the first step, so the first direction
/// change is never held.
const INITIAL_MINUTES_AT_MODE: f64 = 1000.0;

/// A strategy that decides how much power the battery should move.
///
/// Implementations set the step's charge permissions on the power-flow state
/// and return the desired battery power; the shared loop in [`Dispatcher`]
/// does the rest.
pub trait DispatchPolicy {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Returns the desired battery power (kW, positive = discharge).
    ///
    /// # Arguments
    ///
    /// * `input` - External signals for this step
    /// * `config` - Dispatch limits
    /// * `battery` - Battery state at the start of the step
    /// * `power_flow` - Power-flow collaborator, inputs already loaded
    fn compute_desired_power<B: BatteryModel, F: PowerFlow>(
        &mut self,
        input: &StepInput,
        config: &DispatchConfig,
        battery: &B,
        power_flow: &mut F,
    ) -> f64;

    /// Revises a trial current in place; returns `true` to re-run the battery.
    fn check_constraints(&self, ctx: &ConstraintContext<'_>, current: &mut f64) -> bool {
        constraints::check_base(ctx, current)
    }
}

/// Summary of one dispatch call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchOutcome {
    /// Power the policy asked for (kW).
    pub desired_kw: f64,
    /// Reconciled battery power (kW).
    pub battery_kw: f64,
    /// Final battery current (A).
    pub current: f64,
    /// Battery runs used this step.
    pub iterations: usize,
    /// Whether the minimum dwell forced the battery to idle.
    pub held: bool,
}

/// Drives one battery through the dispatch loop for one policy.
///
/// Generic over the policy and the power-flow collaborator for static
/// dispatch. The dispatcher owns its power-flow state and borrows the
/// battery for each call; cloning a dispatcher gives an independent copy
/// for re-runs from a common state.
#[derive(Debug, Clone)]
pub struct Dispatcher<P, F = BatteryPowerFlow> {
    config: DispatchConfig,
    policy: P,
    power_flow: F,
    charging: bool,
    prev_charging: bool,
    minutes_at_mode: f64,
    target_kw: f64,
    last_iterations: usize,
}

impl<P: DispatchPolicy> Dispatcher<P> {
    /// Creates a dispatcher with an AC-connected, lossless power flow.
    pub fn new(config: DispatchConfig, policy: P) -> Self {
        Self::with_power_flow(config, policy, BatteryPowerFlow::default())
    }
}

impl<P: DispatchPolicy, F: PowerFlow> Dispatcher<P, F> {
    /// Creates a dispatcher around a specific power-flow model.
    ///
    /// # Panics
    ///
    /// Panics if `dt_hours` is not positive or the SOC window is empty.
    pub fn with_power_flow(config: DispatchConfig, policy: P, power_flow: F) -> Self {
        assert!(config.dt_hours > 0.0, "dt_hours must be > 0");
        assert!(config.soc_min < config.soc_max, "soc_min must be < soc_max");
        Self {
            config,
            policy,
            power_flow,
            charging: false,
            prev_charging: false,
            minutes_at_mode: INITIAL_MINUTES_AT_MODE,
            target_kw: 0.0,
            last_iterations: 0,
        }
    }

    /// Dispatches the battery for one substep.
    ///
    /// Mutates `battery` in place; on return its state matches the last
    /// accepted trial run.
    pub fn dispatch<B: BatteryModel>(
        &mut self,
        battery: &mut B,
        input: &StepInput,
    ) -> DispatchOutcome {
        let index = input.index(self.config.steps_per_hour());

        let state = self.power_flow.state_mut();
        state.set_inputs(input.pv_kw, input.pv_clipped_kw, input.load_kw);
        state.battery_charge_max_kw = self.config.power_charge_max;
        state.battery_discharge_max_kw = self.config.power_discharge_max;

        let desired_kw = self.policy.compute_desired_power(
            input,
            &self.config,
            battery,
            &mut self.power_flow,
        );
        self.set_desired_power(desired_kw);
        let held = self.switch_controller();
        self.target_kw = self.power_flow.state().battery_kw;

        let current = self.iterate(battery, index);

        DispatchOutcome {
            desired_kw,
            battery_kw: self.power_flow.state().battery_kw,
            current,
            iterations: self.last_iterations,
            held,
        }
    }

    fn set_desired_power(&mut self, desired_kw: f64) {
        if desired_kw > 0.0 {
            self.charging = false;
        } else if desired_kw < 0.0 {
            self.charging = true;
        } else {
            self.charging = self.prev_charging;
        }
        self.power_flow.state_mut().battery_kw = desired_kw;
    }

    /// Holds the battery idle when the direction flips before the minimum
    /// dwell has elapsed. Returns `true` when the step was held.
    ///
    /// A held step counts twice toward the time in mode: once for the step
    /// that was refused and once for the step itself.
    fn switch_controller(&mut self) -> bool {
        let step_minutes = (self.config.dt_hours * 60.0).round();
        let mut held = false;
        if self.charging != self.prev_charging {
            if self.minutes_at_mode <= self.config.min_dwell_minutes {
                debug!(
                    minutes_at_mode = self.minutes_at_mode,
                    min_dwell = self.config.min_dwell_minutes,
                    "direction change held"
                );
                self.power_flow.state_mut().battery_kw = 0.0;
                self.charging = self.prev_charging;
                self.minutes_at_mode += step_minutes;
                held = true;
            } else {
                self.minutes_at_mode = 0.0;
            }
        }
        self.minutes_at_mode += step_minutes;
        held
    }

    fn iterate<B: BatteryModel>(&mut self, battery: &mut B, index: usize) -> f64 {
        let max_iterations = self.config.max_iterations.max(1);
        let mut current =
            self.power_flow.state().battery_kw / (battery.voltage_nominal() * W_TO_KW);
        constraints::restrict_current(&self.config, &mut current);

        let soc_start = battery.soc();
        let snapshot = battery.snapshot();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let requested = current;
            battery.run(index, current);
            current = battery.current();
            let accepted = current;
            self.power_flow.state_mut().battery_kw = current * battery.voltage() * W_TO_KW;
            self.power_flow.calculate();

            let ctx = ConstraintContext {
                config: &self.config,
                flows: self.power_flow.state(),
                battery: BatteryReading::from_model(battery),
                soc_start,
                target_kw: self.target_kw,
                requested,
                attempt,
            };
            let retry = self.policy.check_constraints(&ctx, &mut current);
            trace!(attempt, current, soc = ctx.battery.soc, retry, "dispatch iteration");

            // A vetoed reversal idles the battery; the trial run must not stick.
            let vetoed = !retry && current == 0.0 && accepted != 0.0;
            if retry || vetoed {
                battery.restore(&snapshot);
                self.power_flow.state_mut().clear_flows();
            }
            if vetoed {
                battery.run(index, 0.0);
                current = battery.current();
            }
            self.power_flow.state_mut().battery_kw = current * battery.voltage() * W_TO_KW;

            if !retry {
                break;
            }
            if attempt >= max_iterations {
                debug!(attempt, current, "iteration cap reached with a retry pending");
                break;
            }
        }

        if attempt >= max_iterations {
            debug!(
                index,
                attempt,
                policy = self.policy.name(),
                "dispatch stopped at iteration cap"
            );
        }

        self.power_flow.calculate();
        self.prev_charging = self.charging;
        self.last_iterations = attempt;
        current
    }

    /// Reconciled battery power from the last call (kW).
    pub fn battery_power_kw(&self) -> f64 {
        self.power_flow.state().battery_kw
    }

    /// Grid power from the last call (kW, positive = export).
    pub fn grid_power_kw(&self) -> f64 {
        self.power_flow.state().grid_kw
    }

    /// Grid-to-battery power from the last call (kW).
    pub fn grid_to_battery_kw(&self) -> f64 {
        self.power_flow.state().grid_to_battery_kw
    }

    /// PV-to-battery power from the last call (kW).
    pub fn pv_to_battery_kw(&self) -> f64 {
        self.power_flow.state().pv_to_battery_kw
    }

    /// Full power split from the last call.
    pub fn flows(&self) -> &PowerFlowState {
        self.power_flow.state()
    }

    /// Whether the battery is in charging mode.
    pub fn charging(&self) -> bool {
        self.charging
    }

    /// Battery runs used by the last call.
    pub fn last_iterations(&self) -> usize {
        self.last_iterations
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Mutable policy access, for installing forecasts between steps.
    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::SimpleBattery;
    use crate::dispatch::types::RestrictionMode;
    use approx::assert_abs_diff_eq;

    /// Asks for a fixed power and allows every source.
    #[derive(Debug, Clone)]
    struct FixedPower(f64);

    impl DispatchPolicy for FixedPower {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn compute_desired_power<B: BatteryModel, F: PowerFlow>(
            &mut self,
            _input: &StepInput,
            _config: &DispatchConfig,
            _battery: &B,
            power_flow: &mut F,
        ) -> f64 {
            let s = power_flow.state_mut();
            s.can_pv_charge = true;
            s.can_grid_charge = true;
            s.can_discharge = true;
            self.0
        }
    }

    fn config() -> DispatchConfig {
        DispatchConfig {
            soc_min: 10.0,
            soc_max: 90.0,
            current_charge_max: 100.0,
            current_discharge_max: 100.0,
            power_charge_max: 10.0,
            power_discharge_max: 10.0,
            ..DispatchConfig::default()
        }
    }

    fn input(hour: usize, load_kw: f64) -> StepInput {
        StepInput {
            hour_of_year: hour,
            load_kw,
            ..StepInput::default()
        }
    }

    #[test]
    fn unconstrained_request_passes_through() {
        let mut battery = SimpleBattery::new(100.0, 100.0, 50.0, 1.0);
        let mut dispatcher = Dispatcher::new(config(), FixedPower(2.0));
        let out = dispatcher.dispatch(&mut battery, &input(0, 5.0));
        assert_abs_diff_eq!(out.battery_kw, 2.0, epsilon = 1e-9);
        assert_eq!(out.iterations, 1);
        assert_abs_diff_eq!(battery.soc(), 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(dispatcher.grid_power_kw(), -3.0, epsilon = 1e-9);
    }

    #[test]
    fn discharge_stops_at_soc_min() {
        let mut battery = SimpleBattery::new(100.0, 100.0, 15.0, 1.0);
        let mut dispatcher = Dispatcher::new(config(), FixedPower(3.0));
        let out = dispatcher.dispatch(&mut battery, &input(0, 5.0));
        assert_eq!(out.iterations, 2);
        assert_abs_diff_eq!(battery.soc(), 10.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out.battery_kw, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn power_limit_caps_request() {
        let mut battery = SimpleBattery::new(1000.0, 100.0, 50.0, 1.0);
        let cfg = DispatchConfig {
            restriction: RestrictionMode::Power,
            power_discharge_max: 4.0,
            ..config()
        };
        let mut dispatcher = Dispatcher::new(cfg, FixedPower(8.0));
        let out = dispatcher.dispatch(&mut battery, &input(0, 10.0));
        assert_abs_diff_eq!(out.battery_kw, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn debounce_holds_direction_change() {
        let mut battery = SimpleBattery::new(1000.0, 100.0, 50.0, 1.0);
        let cfg = DispatchConfig {
            min_dwell_minutes: 120.0,
            ..config()
        };
        let mut dispatcher = Dispatcher::new(cfg, FixedPower(-2.0));
        dispatcher.dispatch(&mut battery, &input(0, 0.0));
        assert!(dispatcher.charging());

        dispatcher.policy_mut().0 = 2.0;
        let out = dispatcher.dispatch(&mut battery, &input(1, 5.0));
        assert!(out.held);
        assert_eq!(out.battery_kw, 0.0);
        assert!(dispatcher.charging());

        // the held hour counts twice, so 120 minutes have elapsed by hour 2
        let out = dispatcher.dispatch(&mut battery, &input(2, 5.0));
        assert!(!out.held);
        assert_abs_diff_eq!(out.battery_kw, 2.0, epsilon = 1e-9);
        assert!(!dispatcher.charging());
    }

    #[test]
    fn zero_request_keeps_previous_direction() {
        let mut battery = SimpleBattery::new(1000.0, 100.0, 50.0, 1.0);
        let mut dispatcher = Dispatcher::new(config(), FixedPower(-1.0));
        dispatcher.dispatch(&mut battery, &input(0, 0.0));
        dispatcher.policy_mut().0 = 0.0;
        dispatcher.dispatch(&mut battery, &input(1, 0.0));
        assert!(dispatcher.charging());
    }

    #[test]
    fn clone_replays_identically() {
        let mut battery = SimpleBattery::new(100.0, 100.0, 50.0, 1.0);
        let mut dispatcher = Dispatcher::new(config(), FixedPower(1.5));
        dispatcher.dispatch(&mut battery, &input(0, 2.0));

        let mut battery_copy = battery.clone();
        let mut dispatcher_copy = dispatcher.clone();
        let a = dispatcher.dispatch(&mut battery, &input(1, 2.0));
        let b = dispatcher_copy.dispatch(&mut battery_copy, &input(1, 2.0));
        assert_eq!(a, b);
        assert_eq!(battery.soc(), battery_copy.soc());
    }
}
