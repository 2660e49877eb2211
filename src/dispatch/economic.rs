use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::devices::BatteryModel;
use crate::sim::clock::HOURS_PER_YEAR;
use crate::sim::schedule::PriceSchedule;

use super::constraints::{self, ConstraintContext};
use super::core::DispatchPolicy;
use super::power_flow::PowerFlow;
use super::types::{ChargePermissions, DispatchConfig, StepInput};

/// Cycle cost assumed when none is configured ($/kWh).
pub const DEFAULT_CYCLE_COST: f64 = 0.05;

/// How the cost of cycling the battery is priced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum CycleCost {
    /// A fixed cost per kWh cycled.
    Fixed { cost_per_kwh: f64 },
    /// Capacity lost per cycle times the battery replacement cost.
    Modeled { replacement_cost_per_kwh: f64 },
}

impl Default for CycleCost {
    fn default() -> Self {
        Self::Fixed {
            cost_per_kwh: DEFAULT_CYCLE_COST,
        }
    }
}

impl CycleCost {
    /// Cost of cycling one kWh at the battery's current depth of discharge.
    pub fn cost<B: BatteryModel>(&self, battery: &B) -> f64 {
        match *self {
            Self::Fixed { cost_per_kwh } => cost_per_kwh,
            Self::Modeled {
                replacement_cost_per_kwh,
            } => 0.01 * battery.cycle_damage_pct() * replacement_cost_per_kwh,
        }
    }
}

/// Round-trip efficiencies used to value stored energy, as fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomicEfficiencies {
    pub pv_charge: f64,
    pub grid_charge: f64,
    pub discharge: f64,
}

impl Default for EconomicEfficiencies {
    fn default() -> Self {
        Self {
            pv_charge: 0.96,
            grid_charge: 0.96,
            discharge: 0.96,
        }
    }
}

/// Benefits of each charge source over the look-ahead window ($/kWh).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Benefits {
    pub grid_charge: f64,
    pub pv_charge: f64,
    pub clip_charge: f64,
}

/// Front-of-meter automatic dispatch driven by sale prices.
///
/// Every `update_hours` the policy compares what stored energy will earn at
/// the best price within the look-ahead window against what it costs to
/// store now, and picks one battery power for the whole interval.
#[derive(Debug, Clone)]
pub struct EconomicPolicy {
    permissions: ChargePermissions,
    steps_per_hour: usize,
    look_ahead_hours: usize,
    update_steps: usize,
    inverter_ac_kw: f64,
    ppa_price: f64,
    ppa_factors: Vec<f64>,
    purchase_rates: PriceSchedule,
    cycle_cost: CycleCost,
    efficiencies: EconomicEfficiencies,
    custom: Option<Vec<f64>>,
    clipped_forecast: Vec<f64>,
    last_update: Option<usize>,
    battery_current: f64,
    last_benefits: Option<Benefits>,
}

impl EconomicPolicy {
    /// Creates an economic policy.
    ///
    /// # Arguments
    ///
    /// * `permissions` - Which sources may charge the battery
    /// * `steps_per_hour` - Substeps per hour
    /// * `look_ahead_hours` - Horizon searched for the best sale price
    /// * `update_hours` - Hours between decisions
    /// * `inverter_ac_kw` - Inverter AC rating (kW)
    /// * `ppa_price` - Base PPA sale price ($/kWh)
    /// * `ppa_factors` - Time-of-delivery factors applied to `ppa_price`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        permissions: ChargePermissions,
        steps_per_hour: usize,
        look_ahead_hours: usize,
        update_hours: f64,
        inverter_ac_kw: f64,
        ppa_price: f64,
        ppa_factors: &PriceSchedule,
        purchase_rates: PriceSchedule,
    ) -> Self {
        let steps_per_hour = steps_per_hour.max(1);
        let dt = 1.0 / steps_per_hour as f64;
        let update_steps = ((update_hours / dt).ceil() as usize).max(1);
        Self {
            permissions,
            steps_per_hour,
            look_ahead_hours: look_ahead_hours.max(1),
            update_steps,
            inverter_ac_kw,
            ppa_price,
            ppa_factors: ppa_factors.per_step(steps_per_hour, look_ahead_hours.max(1)),
            purchase_rates,
            cycle_cost: CycleCost::default(),
            efficiencies: EconomicEfficiencies::default(),
            custom: None,
            clipped_forecast: Vec::new(),
            last_update: None,
            battery_current: 0.0,
            last_benefits: None,
        }
    }

    pub fn with_cycle_cost(mut self, cycle_cost: CycleCost) -> Self {
        self.cycle_cost = cycle_cost;
        self
    }

    pub fn with_efficiencies(mut self, efficiencies: EconomicEfficiencies) -> Self {
        self.efficiencies = efficiencies;
        self
    }

    /// Installs the clipped-PV forecast, one value per substep (kW).
    pub fn set_clipped_forecast(&mut self, clipped_kw: Vec<f64>) {
        self.clipped_forecast = clipped_kw;
    }

    /// Follows an externally supplied battery power series instead of
    /// deciding on prices. Indexed modulo one year.
    pub fn set_custom_dispatch(&mut self, battery_kw: Vec<f64>) {
        self.custom = Some(battery_kw);
    }

    /// Benefits computed at the last decision.
    pub fn last_benefits(&self) -> Option<Benefits> {
        self.last_benefits
    }

    fn ppa_at(&self, step_of_year: usize) -> f64 {
        self.ppa_price * self.ppa_factors[step_of_year % self.ppa_factors.len()]
    }

    fn clipped_energy_ahead(&self, idx: usize, dt: f64) -> f64 {
        if self.clipped_forecast.is_empty() {
            return 0.0;
        }
        let len = self.clipped_forecast.len();
        (idx..idx + self.look_ahead_hours * self.steps_per_hour)
            .map(|i| self.clipped_forecast[i % len])
            .sum::<f64>()
            * dt
    }

    fn decide<B: BatteryModel>(
        &mut self,
        input: &StepInput,
        idx: usize,
        config: &DispatchConfig,
        battery: &B,
    ) -> f64 {
        let dt = config.dt_hours;
        let step_of_year = idx % (HOURS_PER_YEAR * self.steps_per_hour);
        let window = self.look_ahead_hours * self.steps_per_hour;

        let cycle_cost = self.cycle_cost.cost(battery);
        let usage_cost = self.purchase_rates.value_at(input.hour_of_year);
        let ppa_now = self.ppa_at(step_of_year);
        let max_ppa = (step_of_year..step_of_year + window)
            .map(|i| self.ppa_at(i))
            .fold(f64::NEG_INFINITY, f64::max);

        let eta = self.efficiencies;
        let benefits = Benefits {
            grid_charge: max_ppa * eta.discharge - usage_cost / eta.grid_charge,
            pv_charge: max_ppa * eta.discharge - ppa_now / eta.pv_charge,
            clip_charge: max_ppa * eta.discharge,
        };
        self.last_benefits = Some(benefits);

        let clipped_ahead = self.clipped_energy_ahead(idx, dt);
        let mut energy_needed = battery.energy_to_fill(config.soc_max);
        let pv = input.pv_kw;
        let clipped = input.pv_clipped_kw;
        let p = self.permissions;
        let mut power = 0.0;

        if p.can_clip_charge && clipped > 0.0 && benefits.clip_charge > cycle_cost {
            power = -clipped;
        }

        if p.can_charge && benefits.pv_charge > cycle_cost && benefits.pv_charge > 0.0 && pv > 0.0 {
            if p.can_clip_charge {
                // leave room for the clipped energy still to come
                if clipped_ahead < energy_needed {
                    let can_charge = energy_needed - clipped_ahead;
                    power = if can_charge <= pv * dt {
                        -(can_charge / dt).max(clipped)
                    } else {
                        -pv.max(clipped)
                    };
                    energy_needed = (energy_needed + power * dt).max(0.0);
                }
            } else {
                power = -pv;
            }
        }

        if p.can_grid_charge
            && benefits.grid_charge > cycle_cost
            && benefits.grid_charge > 0.0
            && energy_needed > 0.0
        {
            if p.can_clip_charge {
                if clipped_ahead < energy_needed {
                    power -= (energy_needed - clipped_ahead) / dt;
                }
            } else {
                power = -energy_needed / dt;
            }
        }

        let high_value = ppa_now >= max_ppa;
        let inverter_headroom = self.inverter_ac_kw > pv;
        let has_energy = battery.soc() >= config.soc_min + 1.0;
        if high_value && inverter_headroom && has_energy {
            power = self.inverter_ac_kw - pv;
        }

        debug!(
            idx,
            grid_benefit = benefits.grid_charge,
            pv_benefit = benefits.pv_charge,
            clip_benefit = benefits.clip_charge,
            cycle_cost,
            power,
            "economic dispatch decision"
        );
        power
    }
}

impl DispatchPolicy for EconomicPolicy {
    fn name(&self) -> &'static str {
        "economic"
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
        if let Some(custom) = &self.custom {
            let year_steps = HOURS_PER_YEAR * self.steps_per_hour;
            self.battery_current = if custom.is_empty() {
                0.0
            } else {
                custom[(idx % year_steps) % custom.len()]
            };
        } else {
            let due = match self.last_update {
                None => true,
                Some(last) => idx >= last + self.update_steps,
            };
            if due {
                self.last_update = Some(idx);
                self.battery_current = self.decide(input, idx, config, battery);
            }
        }

        input.desired_battery_kw.unwrap_or(self.battery_current)
    }

    fn check_constraints(&self, ctx: &ConstraintContext<'_>, current: &mut f64) -> bool {
        constraints::check_automatic(ctx, current, self.permissions)
    }
}
