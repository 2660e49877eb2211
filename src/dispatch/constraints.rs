//! Constraint enforcement for trial battery currents.
//!
//! Every check revises the trial current in place and reports whether the
//! battery has to be re-run. Checks compose in layers: the base layer runs
//! first and the policy layers ([`check_manual`], [`check_automatic`]) only
//! add their corrections when the base layer asked for no retry.
//!
//! Current is positive when discharging and negative when charging.

use crate::devices::BatteryModel;

use super::power_flow::PowerFlowState;
use super::types::{ChargePermissions, DispatchConfig};
use super::{LOW_TOLERANCE, TOLERANCE, W_TO_KW};

/// Battery readings taken after a trial run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    /// SOC after the run (%).
    pub soc: f64,
    /// Terminal voltage after the run (V).
    pub voltage: f64,
    /// Maximum charge capacity (Ah).
    pub charge_maximum: f64,
    /// Maximum charge capacity at temperature (Ah).
    pub charge_maximum_thermal: f64,
}

impl BatteryReading {
    /// Reads the current state of a battery model.
    pub fn from_model<B: BatteryModel>(battery: &B) -> Self {
        Self {
            soc: battery.soc(),
            voltage: battery.voltage(),
            charge_maximum: battery.charge_maximum(),
            charge_maximum_thermal: battery.charge_maximum_thermal(),
        }
    }
}

/// Everything a constraint check may read.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintContext<'a> {
    pub config: &'a DispatchConfig,
    pub flows: &'a PowerFlowState,
    pub battery: BatteryReading,
    /// SOC before any trial run this step (%).
    pub soc_start: f64,
    /// Battery power the policy asked for, after debounce (kW).
    pub target_kw: f64,
    /// Current passed to the battery on this attempt (A); the battery may
    /// have accepted less.
    pub requested: f64,
    /// Number of battery runs so far this step, starting at 1.
    pub attempt: usize,
}

/// Base SOC and grid-charge corrections. Only one branch applies per call.
///
/// Returns `true` if the current was changed.
pub fn correct_soc_and_grid_charge(ctx: &ConstraintContext<'_>, current: &mut f64) -> bool {
    let cfg = ctx.config;
    let b = ctx.battery;
    let flows = ctx.flows;
    let dt = cfg.dt_hours;

    if *current > 0.0 && b.soc < cfg.soc_min - TOLERANCE {
        *current -= 0.01 * (cfg.soc_min - b.soc) * b.charge_maximum_thermal / dt;
        true
    } else if *current < 0.0 && b.soc > cfg.soc_max + TOLERANCE {
        *current += 0.01 * (b.soc - cfg.soc_max) * b.charge_maximum_thermal / dt;
        true
    } else if *current < 0.0 && flows.grid_to_battery_kw > TOLERANCE && !flows.can_grid_charge {
        let battery_kw = flows.battery_kw.abs();
        if battery_kw < TOLERANCE {
            *current += flows.grid_to_battery_kw / (b.voltage * W_TO_KW);
        } else {
            *current += (flows.grid_to_battery_kw / battery_kw) * current.abs();
        }
        true
    } else {
        false
    }
}

/// Clamps current to `[-current_charge_max, current_discharge_max]` when
/// current limits are active.
///
/// Returns `true` if the current was clamped.
pub fn restrict_current(config: &DispatchConfig, current: &mut f64) -> bool {
    if !config.restriction.limits_current() {
        return false;
    }
    if *current < 0.0 && current.abs() > config.current_charge_max {
        *current = -config.current_charge_max;
        true
    } else if *current > config.current_discharge_max {
        *current = config.current_discharge_max;
        true
    } else {
        false
    }
}

/// Shrinks current proportionally when the implied power exceeds the
/// power limit by more than [`LOW_TOLERANCE`] (relative).
///
/// Returns `true` if the current was reduced.
pub fn restrict_power(config: &DispatchConfig, voltage: f64, current: &mut f64) -> bool {
    if !config.restriction.limits_power() {
        return false;
    }
    let power_kw = *current * voltage * W_TO_KW;
    let excess_kw = if power_kw < 0.0
        && power_kw.abs() > config.power_charge_max * (1.0 + LOW_TOLERANCE)
    {
        (config.power_charge_max - power_kw.abs()).abs()
    } else if power_kw > config.power_discharge_max * (1.0 + LOW_TOLERANCE) {
        (config.power_discharge_max - power_kw).abs()
    } else {
        return false;
    };
    *current -= (excess_kw / power_kw.abs()) * *current;
    true
}

/// Applies the electrical limits, the iteration cap and the
/// direction-reversal veto after a layer's own correction.
///
/// `initial` is the current as it stood before this layer changed anything.
pub fn settle(
    ctx: &ConstraintContext<'_>,
    current: &mut f64,
    initial: f64,
    corrected: bool,
) -> bool {
    let current_limited = restrict_current(ctx.config, current);
    let power_limited = restrict_power(ctx.config, ctx.battery.voltage, current);

    let mut iterate = corrected || current_limited || power_limited;
    if ctx.attempt >= ctx.config.max_iterations {
        iterate = false;
    }

    if current.abs() > TOLERANCE && initial / *current < 0.0 {
        tracing::debug!(initial, revised = *current, "direction reversal vetoed");
        *current = 0.0;
        iterate = false;
    }
    iterate
}

/// Base constraint layer shared by every policy.
pub fn check_base(ctx: &ConstraintContext<'_>, current: &mut f64) -> bool {
    let initial = *current;
    let corrected = correct_soc_and_grid_charge(ctx, current);
    settle(ctx, current, initial, corrected)
}

/// Grows charging current to absorb PV that would otherwise be exported,
/// bounded by the charge still needed to reach SOC max.
pub fn absorb_pv_export(ctx: &ConstraintContext<'_>, current: &mut f64) {
    let flows = ctx.flows;
    let b = ctx.battery;
    let battery_kw = flows.battery_kw.abs();
    let d_current = if battery_kw < TOLERANCE {
        flows.pv_to_grid_kw / (b.voltage * W_TO_KW)
    } else {
        (flows.pv_to_grid_kw / battery_kw) * current.abs()
    };
    let d_charge_ah = 0.01 * (ctx.config.soc_max - b.soc) * b.charge_maximum;
    *current -= d_current.min(d_charge_ah / ctx.config.dt_hours);
}

/// Shrinks discharge current by the fraction flowing to the grid.
pub fn curb_battery_export(ctx: &ConstraintContext<'_>, current: &mut f64) {
    let battery_kw = ctx.flows.battery_kw.abs();
    if battery_kw < TOLERANCE {
        return;
    }
    *current -= (ctx.flows.battery_to_grid_kw / battery_kw) * current.abs();
}

/// Constraint layer for schedule-driven dispatch.
///
/// # Arguments
///
/// * `ctx` - Readings for this attempt
/// * `current` - Trial current, revised in place
/// * `can_charge` - Whether the active profile allows charging
pub fn check_manual(ctx: &ConstraintContext<'_>, current: &mut f64, can_charge: bool) -> bool {
    if check_base(ctx, current) {
        return true;
    }

    let cfg = ctx.config;
    let flows = ctx.flows;
    let initial = *current;

    let corrected = if flows.pv_to_grid_kw > LOW_TOLERANCE
        && can_charge
        && ctx.battery.soc < cfg.soc_max - 1.0
        && current.abs() < cfg.current_charge_max
        && flows.battery_kw.abs() < cfg.power_charge_max
        && *current <= 0.0
    {
        absorb_pv_export(ctx, current);
        true
    } else if !cfg.is_front_of_meter() && *current > 0.0 && flows.battery_to_grid_kw > TOLERANCE {
        curb_battery_export(ctx, current);
        true
    } else {
        false
    };

    settle(ctx, current, initial, corrected)
}

/// Current (A) the battery can carry this step without crossing the SOC
/// bound in the given direction, measured from the step's starting SOC.
fn soc_headroom_current(ctx: &ConstraintContext<'_>, discharging: bool) -> f64 {
    let cfg = ctx.config;
    let span = if discharging {
        ctx.soc_start - cfg.soc_min
    } else {
        cfg.soc_max - ctx.soc_start
    };
    0.01 * span.max(0.0) * ctx.battery.charge_maximum_thermal / cfg.dt_hours
}

/// Whether the battery accepted less than it was asked for and `tracked`
/// pushes back toward the refused request. Re-running cannot help then.
fn battery_refused(ctx: &ConstraintContext<'_>, accepted: f64, tracked: f64) -> bool {
    let shortfall = ctx.requested - accepted;
    shortfall.abs() > TOLERANCE && (tracked - accepted) * shortfall > 0.0
}

/// Constraint layer for the automatic policies.
///
/// Pulls the current toward the policy's target power unless that would
/// need grid charging the permissions forbid; behind the meter it also
/// applies the PV-export and battery-export corrections.
pub fn check_automatic(
    ctx: &ConstraintContext<'_>,
    current: &mut f64,
    permissions: ChargePermissions,
) -> bool {
    if check_base(ctx, current) {
        return true;
    }

    let cfg = ctx.config;
    let flows = ctx.flows;
    let voltage = ctx.battery.voltage;
    let initial = *current;
    let battery_kw = *current * voltage * W_TO_KW;
    let target_kw = ctx.target_kw;

    let corrected = if (battery_kw - target_kw).abs() > TOLERANCE {
        let dp = battery_kw - target_kw;
        if (target_kw < 0.0 && dp < 0.0) || permissions.can_grid_charge || target_kw > 0.0 {
            let tracked = *current - dp / (voltage * W_TO_KW);
            if battery_refused(ctx, *current, tracked) {
                false
            } else {
                let limit = soc_headroom_current(ctx, tracked > 0.0);
                let mut revised = tracked.clamp(-limit, limit);
                restrict_current(cfg, &mut revised);
                restrict_power(cfg, voltage, &mut revised);
                let changed = (revised - *current).abs() > TOLERANCE;
                *current = revised;
                changed
            }
        } else {
            false
        }
    } else if !cfg.is_front_of_meter() {
        if flows.pv_to_grid_kw > TOLERANCE
            && permissions.can_charge
            && ctx.battery.soc < cfg.soc_max - TOLERANCE
            && current.abs() < cfg.current_charge_max
        {
            absorb_pv_export(ctx, current);
            true
        } else if flows.battery_to_grid_kw > TOLERANCE {
            curb_battery_export(ctx, current);
            true
        } else {
            false
        }
    } else {
        false
    };

    settle(ctx, current, initial, corrected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::types::{MeterPosition, RestrictionMode};
    use approx::assert_abs_diff_eq;

    fn config() -> DispatchConfig {
        DispatchConfig {
            soc_min: 10.0,
            soc_max: 90.0,
            current_charge_max: 50.0,
            current_discharge_max: 80.0,
            power_charge_max: 4.0,
            power_discharge_max: 6.0,
            ..DispatchConfig::default()
        }
    }

    fn reading(soc: f64) -> BatteryReading {
        BatteryReading {
            soc,
            voltage: 100.0,
            charge_maximum: 100.0,
            charge_maximum_thermal: 100.0,
        }
    }

    fn ctx<'a>(
        config: &'a DispatchConfig,
        flows: &'a PowerFlowState,
        soc: f64,
        attempt: usize,
    ) -> ConstraintContext<'a> {
        ConstraintContext {
            config,
            flows,
            battery: reading(soc),
            soc_start: soc,
            target_kw: 0.0,
            requested: 0.0,
            attempt,
        }
    }

    #[test]
    fn discharge_below_soc_min_is_reduced() {
        let cfg = config();
        let flows = PowerFlowState::default();
        let mut current = 30.0;
        let retry = check_base(&ctx(&cfg, &flows, 8.0, 1), &mut current);
        assert!(retry);
        assert_abs_diff_eq!(current, 28.0, epsilon = 1e-9);
    }

    #[test]
    fn charge_above_soc_max_is_reduced() {
        let cfg = config();
        let flows = PowerFlowState::default();
        let mut current = -30.0;
        assert!(check_base(&ctx(&cfg, &flows, 93.0, 1), &mut current));
        assert_abs_diff_eq!(current, -27.0, epsilon = 1e-9);
    }

    #[test]
    fn disallowed_grid_charge_is_removed_proportionally() {
        let cfg = config();
        let flows = PowerFlowState {
            battery_kw: -3.0,
            grid_to_battery_kw: 1.0,
            can_grid_charge: false,
            ..PowerFlowState::default()
        };
        let mut current = -30.0;
        assert!(check_base(&ctx(&cfg, &flows, 50.0, 1), &mut current));
        assert_abs_diff_eq!(current, -20.0, epsilon = 1e-9);
    }

    #[test]
    fn allowed_grid_charge_is_kept() {
        let cfg = config();
        let flows = PowerFlowState {
            battery_kw: -3.0,
            grid_to_battery_kw: 1.0,
            can_grid_charge: true,
            ..PowerFlowState::default()
        };
        let mut current = -30.0;
        assert!(!check_base(&ctx(&cfg, &flows, 50.0, 1), &mut current));
        assert_eq!(current, -30.0);
    }

    #[test]
    fn current_limits_are_asymmetric() {
        let cfg = config();
        let mut charge = -70.0;
        assert!(restrict_current(&cfg, &mut charge));
        assert_eq!(charge, -50.0);

        let mut discharge = 70.0;
        assert!(!restrict_current(&cfg, &mut discharge));
        assert_eq!(discharge, 70.0);

        let mut discharge = 90.0;
        assert!(restrict_current(&cfg, &mut discharge));
        assert_eq!(discharge, 80.0);
    }

    #[test]
    fn current_limits_ignored_in_power_mode() {
        let cfg = DispatchConfig {
            restriction: RestrictionMode::Power,
            ..config()
        };
        let mut current = -500.0;
        assert!(!restrict_current(&cfg, &mut current));
    }

    #[test]
    fn power_limit_within_relative_tolerance_is_left_alone() {
        let cfg = config();
        // 4.02 kW charge is inside the 1% band above the 4 kW limit
        let mut current = -40.2;
        assert!(!restrict_power(&cfg, 100.0, &mut current));
        assert_eq!(current, -40.2);
    }

    #[test]
    fn power_limit_charge_boundary_lands_on_limit() {
        let cfg = config();
        let mut current = -40.5;
        assert!(restrict_power(&cfg, 100.0, &mut current));
        assert_abs_diff_eq!(current * 100.0 * W_TO_KW, -4.0, epsilon = 1e-9);
    }

    #[test]
    fn power_limit_discharge_boundary_lands_on_limit() {
        let cfg = config();
        let mut inside_band = 60.5;
        assert!(!restrict_power(&cfg, 100.0, &mut inside_band));

        let mut over = 60.7;
        assert!(restrict_power(&cfg, 100.0, &mut over));
        assert_abs_diff_eq!(over * 100.0 * W_TO_KW, 6.0, epsilon = 1e-9);
    }

    #[test]
    fn reversal_is_vetoed_to_zero() {
        let cfg = config();
        let flows = PowerFlowState::default();
        // deficit of 9% on 100 Ah wants to pull 9 A out of a 5 A discharge
        let mut current = 5.0;
        let retry = check_base(&ctx(&cfg, &flows, 1.0, 1), &mut current);
        assert!(!retry);
        assert_eq!(current, 0.0);
    }

    #[test]
    fn no_retry_once_cap_reached() {
        let cfg = config();
        let flows = PowerFlowState::default();
        let mut current = 30.0;
        let retry = check_base(&ctx(&cfg, &flows, 8.0, cfg.max_iterations), &mut current);
        assert!(!retry);
        assert_abs_diff_eq!(current, 28.0, epsilon = 1e-9);
    }

    #[test]
    fn manual_absorbs_pv_export_up_to_headroom() {
        let cfg = config();
        let flows = PowerFlowState {
            battery_kw: 0.0,
            pv_to_grid_kw: 2.0,
            ..PowerFlowState::default()
        };
        let mut current = 0.0;
        assert!(check_manual(&ctx(&cfg, &flows, 50.0, 1), &mut current, true));
        assert_abs_diff_eq!(current, -20.0, epsilon = 1e-9);

        // near full: 1.5% of 100 Ah of room left
        let cfg_full = DispatchConfig {
            soc_max: 90.0,
            ..config()
        };
        let mut current = 0.0;
        assert!(check_manual(&ctx(&cfg_full, &flows, 88.5, 1), &mut current, true));
        assert_abs_diff_eq!(current, -1.5, epsilon = 1e-9);
    }

    #[test]
    fn manual_ignores_pv_export_without_charge_permission() {
        let cfg = config();
        let flows = PowerFlowState {
            pv_to_grid_kw: 2.0,
            ..PowerFlowState::default()
        };
        let mut current = 0.0;
        assert!(!check_manual(&ctx(&cfg, &flows, 50.0, 1), &mut current, false));
        assert_eq!(current, 0.0);
    }

    #[test]
    fn manual_curbs_battery_export_behind_meter() {
        let cfg = config();
        let flows = PowerFlowState {
            battery_kw: 4.0,
            battery_to_grid_kw: 1.0,
            ..PowerFlowState::default()
        };
        let mut current = 40.0;
        assert!(check_manual(&ctx(&cfg, &flows, 50.0, 1), &mut current, false));
        assert_abs_diff_eq!(current, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn manual_allows_battery_export_front_of_meter() {
        let cfg = DispatchConfig {
            meter: MeterPosition::FrontOfMeter,
            ..config()
        };
        let flows = PowerFlowState {
            battery_kw: 4.0,
            battery_to_grid_kw: 1.0,
            ..PowerFlowState::default()
        };
        let mut current = 40.0;
        assert!(!check_manual(&ctx(&cfg, &flows, 50.0, 1), &mut current, false));
        assert_eq!(current, 40.0);
    }

    #[test]
    fn automatic_tracks_discharge_target() {
        let cfg = config();
        let flows = PowerFlowState::default();
        let mut c = ctx(&cfg, &flows, 50.0, 1);
        c.target_kw = 3.0;
        c.requested = 20.0;
        let mut current = 20.0;
        assert!(check_automatic(&c, &mut current, ChargePermissions::default()));
        assert_abs_diff_eq!(current, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn automatic_does_not_push_charge_without_grid_permission() {
        let cfg = config();
        let flows = PowerFlowState::default();
        let mut c = ctx(&cfg, &flows, 50.0, 1);
        c.target_kw = -3.0;
        let mut current = -10.0;
        assert!(!check_automatic(&c, &mut current, ChargePermissions::default()));
        assert_eq!(current, -10.0);
    }

    #[test]
    fn automatic_tracking_respects_soc_headroom() {
        let cfg = config();
        let flows = PowerFlowState::default();
        let mut c = ctx(&cfg, &flows, 12.0, 2);
        c.target_kw = 5.0;
        c.requested = 2.0;
        // only 2% of 100 Ah above SOC min
        let mut current = 2.0;
        assert!(!check_automatic(&c, &mut current, ChargePermissions::default()));
        assert_abs_diff_eq!(current, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn automatic_stops_when_battery_refuses_charge() {
        let cfg = config();
        let flows = PowerFlowState::default();
        let mut c = ctx(&cfg, &flows, 50.0, 1);
        c.target_kw = -4.0;
        // asked for 40 A, the battery only took 15 A
        c.requested = -40.0;
        let permissions = ChargePermissions {
            can_grid_charge: true,
            ..ChargePermissions::default()
        };
        let mut current = -15.0;
        assert!(!check_automatic(&c, &mut current, permissions));
        assert_abs_diff_eq!(current, -15.0, epsilon = 1e-9);
    }

    #[test]
    fn automatic_still_backs_off_after_refusal() {
        let cfg = config();
        let flows = PowerFlowState::default();
        let mut c = ctx(&cfg, &flows, 50.0, 1);
        c.target_kw = -1.0;
        c.requested = -40.0;
        let mut current = -15.0;
        assert!(check_automatic(&c, &mut current, ChargePermissions::default()));
        assert_abs_diff_eq!(current, -10.0, epsilon = 1e-9);
    }
}
