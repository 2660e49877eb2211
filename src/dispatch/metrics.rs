//! Energy and efficiency accounting over a dispatch run.

use serde::Serialize;

use super::power_flow::PowerFlowState;

/// Energy totals for one accounting period (kWh).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EnergyTotals {
    pub charge: f64,
    pub discharge: f64,
    pub charge_from_pv: f64,
    pub charge_from_grid: f64,
    pub system_loss: f64,
    pub grid_import: f64,
    pub grid_export: f64,
}

impl EnergyTotals {
    fn add_step(&mut self, flows: &PowerFlowState, dt: f64) {
        let battery = flows.battery_kw;
        if battery < 0.0 {
            self.charge += -battery * dt;
            self.charge_from_pv += flows.pv_to_battery_kw * dt;
            self.charge_from_grid += flows.grid_to_battery_kw * dt;
        } else if battery > 0.0 {
            self.discharge += battery * dt;
        }
        self.system_loss += flows.conversion_loss_kw * dt;
        if flows.grid_kw > 0.0 {
            self.grid_export += flows.grid_kw * dt;
        } else {
            self.grid_import += -flows.grid_kw * dt;
        }
    }
}

/// Running battery energy metrics.
///
/// Lifetime totals accumulate for the whole run; annual totals restart at
/// [`BatteryMetrics::new_year`]. Efficiencies are percentages over the
/// lifetime totals and stay at 100 until the battery has charged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryMetrics {
    dt_hours: f64,
    lifetime: EnergyTotals,
    annual: EnergyTotals,
    average_efficiency_pct: f64,
    round_trip_efficiency_pct: f64,
    pv_charge_pct: f64,
}

impl BatteryMetrics {
    pub fn new(dt_hours: f64) -> Self {
        Self {
            dt_hours,
            lifetime: EnergyTotals::default(),
            annual: EnergyTotals::default(),
            average_efficiency_pct: 100.0,
            round_trip_efficiency_pct: 100.0,
            pv_charge_pct: 0.0,
        }
    }

    /// Accumulates one step's power split.
    pub fn record(&mut self, flows: &PowerFlowState) {
        self.lifetime.add_step(flows, self.dt_hours);
        self.annual.add_step(flows, self.dt_hours);

        let t = &self.lifetime;
        if t.charge > 0.0 {
            self.average_efficiency_pct = 100.0 * t.discharge / t.charge;
            self.round_trip_efficiency_pct = 100.0 * t.discharge / (t.charge + t.system_loss);
            self.pv_charge_pct = 100.0 * t.charge_from_pv / t.charge;
        }
    }

    /// Starts a new accounting year, keeping lifetime totals.
    pub fn new_year(&mut self) {
        self.annual = EnergyTotals::default();
    }

    pub fn lifetime(&self) -> &EnergyTotals {
        &self.lifetime
    }

    pub fn annual(&self) -> &EnergyTotals {
        &self.annual
    }

    /// Discharged over charged energy (%).
    pub fn average_efficiency_pct(&self) -> f64 {
        self.average_efficiency_pct
    }

    /// Discharged energy over charged energy plus system losses (%).
    pub fn round_trip_efficiency_pct(&self) -> f64 {
        self.round_trip_efficiency_pct
    }

    /// Share of charge energy that came from PV (%).
    pub fn pv_charge_pct(&self) -> f64 {
        self.pv_charge_pct
    }

    /// Conversion loss this year plus system loss this year (kWh).
    pub fn annual_loss(&self) -> f64 {
        (self.annual.charge - self.annual.discharge).max(0.0) + self.annual.system_loss
    }
}
