//! Shared power-state record and the collaborator that splits PV, load,
//! battery and grid power among the physical paths between them.
//!
//! Sign conventions: battery power is positive when discharging and
//! negative when charging; grid power is positive when exporting.

use serde::{Deserialize, Serialize};

use super::TOLERANCE;

/// Every power quantity the dispatch loop reads or writes in one step (kW).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerFlowState {
    pub pv_kw: f64,
    pub pv_clipped_kw: f64,
    pub load_kw: f64,
    pub battery_kw: f64,
    pub grid_kw: f64,
    pub generated_kw: f64,

    pub pv_to_load_kw: f64,
    pub pv_to_battery_kw: f64,
    pub pv_to_grid_kw: f64,
    pub clipped_to_battery_kw: f64,
    pub grid_to_battery_kw: f64,
    pub grid_to_load_kw: f64,
    pub battery_to_load_kw: f64,
    pub battery_to_grid_kw: f64,
    /// Conversion losses between the battery terminals and the AC bus.
    pub conversion_loss_kw: f64,

    /// Charge power used to seed manual dispatch.
    pub battery_charge_max_kw: f64,
    /// Discharge power used to seed manual dispatch.
    pub battery_discharge_max_kw: f64,

    pub can_pv_charge: bool,
    pub can_clip_charge: bool,
    pub can_grid_charge: bool,
    pub can_discharge: bool,

    /// Flows smaller than this are reported as zero.
    pub tolerance: f64,
}

impl Default for PowerFlowState {
    fn default() -> Self {
        Self {
            pv_kw: 0.0,
            pv_clipped_kw: 0.0,
            load_kw: 0.0,
            battery_kw: 0.0,
            grid_kw: 0.0,
            generated_kw: 0.0,
            pv_to_load_kw: 0.0,
            pv_to_battery_kw: 0.0,
            pv_to_grid_kw: 0.0,
            clipped_to_battery_kw: 0.0,
            grid_to_battery_kw: 0.0,
            grid_to_load_kw: 0.0,
            battery_to_load_kw: 0.0,
            battery_to_grid_kw: 0.0,
            conversion_loss_kw: 0.0,
            battery_charge_max_kw: 0.0,
            battery_discharge_max_kw: 0.0,
            can_pv_charge: false,
            can_clip_charge: false,
            can_grid_charge: false,
            can_discharge: false,
            tolerance: TOLERANCE,
        }
    }
}

impl PowerFlowState {
    /// Loads the step's external inputs and zeroes every derived flow.
    pub fn set_inputs(&mut self, pv_kw: f64, pv_clipped_kw: f64, load_kw: f64) {
        self.pv_kw = pv_kw.max(0.0);
        self.pv_clipped_kw = pv_clipped_kw.max(0.0);
        self.load_kw = load_kw.max(0.0);
        self.clear_flows();
    }

    /// Zeroes battery power and every derived flow, keeping inputs and permissions.
    pub fn clear_flows(&mut self) {
        self.battery_kw = 0.0;
        self.clear_sub_flows();
    }

    fn clear_sub_flows(&mut self) {
        self.grid_kw = 0.0;
        self.generated_kw = 0.0;
        self.pv_to_load_kw = 0.0;
        self.pv_to_battery_kw = 0.0;
        self.pv_to_grid_kw = 0.0;
        self.clipped_to_battery_kw = 0.0;
        self.grid_to_battery_kw = 0.0;
        self.grid_to_load_kw = 0.0;
        self.battery_to_load_kw = 0.0;
        self.battery_to_grid_kw = 0.0;
        self.conversion_loss_kw = 0.0;
    }

    fn snap_to_zero(&mut self) {
        let tol = self.tolerance;
        for flow in [
            &mut self.pv_to_load_kw,
            &mut self.pv_to_battery_kw,
            &mut self.pv_to_grid_kw,
            &mut self.clipped_to_battery_kw,
            &mut self.grid_to_battery_kw,
            &mut self.grid_to_load_kw,
            &mut self.battery_to_load_kw,
            &mut self.battery_to_grid_kw,
            &mut self.conversion_loss_kw,
        ] {
            if flow.abs() < tol {
                *flow = 0.0;
            }
        }
    }
}

/// The power-flow collaborator driven by the dispatch loop.
pub trait PowerFlow {
    /// Shared state record.
    fn state(&self) -> &PowerFlowState;

    /// Mutable access to the shared state record.
    fn state_mut(&mut self) -> &mut PowerFlowState;

    /// Clears sub-flows and seeds battery power from the permissions.
    fn initialize(&mut self);

    /// Re-derives every sub-flow from PV, load and battery power.
    fn calculate(&mut self);
}

/// Where the battery joins the PV system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Battery has its own inverter on the AC bus.
    #[default]
    Ac,
    /// Battery shares the PV DC bus ahead of the PV inverter.
    Dc,
}

/// Single-point conversion efficiencies (0..1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversionEfficiency {
    pub ac_to_dc: f64,
    pub dc_to_ac: f64,
    pub dc_to_dc: f64,
}

impl Default for ConversionEfficiency {
    fn default() -> Self {
        Self {
            ac_to_dc: 1.0,
            dc_to_ac: 1.0,
            dc_to_dc: 1.0,
        }
    }
}

/// Reference power-flow model for PV + storage + load systems.
///
/// PV serves load first. A charging battery takes PV surplus before grid
/// power (DC-connected systems take clipped PV before either). A discharging
/// battery serves the remaining load before exporting.
#[derive(Debug, Clone, Default)]
pub struct BatteryPowerFlow {
    state: PowerFlowState,
    connection: ConnectionMode,
    efficiency: ConversionEfficiency,
}

impl BatteryPowerFlow {
    /// Creates a power-flow model.
    ///
    /// # Panics
    ///
    /// Panics if any efficiency is outside `(0, 1]`.
    pub fn new(connection: ConnectionMode, efficiency: ConversionEfficiency) -> Self {
        for eta in [efficiency.ac_to_dc, efficiency.dc_to_ac, efficiency.dc_to_dc] {
            assert!(eta > 0.0 && eta <= 1.0, "efficiencies must be in (0, 1]");
        }
        Self {
            state: PowerFlowState::default(),
            connection,
            efficiency,
        }
    }

    /// Connection mode of this model.
    pub fn connection(&self) -> ConnectionMode {
        self.connection
    }

    fn calculate_ac(&mut self) {
        let eff = self.efficiency;
        let s = &mut self.state;
        let pv_to_load = s.pv_kw.min(s.load_kw);
        let mut pv_surplus = s.pv_kw - pv_to_load;
        let mut unmet_load = s.load_kw - pv_to_load;

        if s.battery_kw < 0.0 {
            let draw = -s.battery_kw / eff.ac_to_dc;
            s.pv_to_battery_kw = pv_surplus.min(draw);
            s.grid_to_battery_kw = draw - s.pv_to_battery_kw;
            pv_surplus -= s.pv_to_battery_kw;
            s.conversion_loss_kw = draw + s.battery_kw;
        } else if s.battery_kw > 0.0 {
            let supply = s.battery_kw * eff.dc_to_ac;
            s.battery_to_load_kw = supply.min(unmet_load);
            s.battery_to_grid_kw = supply - s.battery_to_load_kw;
            unmet_load -= s.battery_to_load_kw;
            s.conversion_loss_kw = s.battery_kw - supply;
        }

        s.pv_to_load_kw = pv_to_load;
        s.pv_to_grid_kw = pv_surplus;
        s.grid_to_load_kw = unmet_load;
    }

    fn calculate_dc(&mut self) {
        let eff = self.efficiency;
        let s = &mut self.state;
        let pv_to_load = s.pv_kw.min(s.load_kw);
        let mut pv_surplus = s.pv_kw - pv_to_load;
        let mut unmet_load = s.load_kw - pv_to_load;

        if s.battery_kw < 0.0 {
            let mut need = -s.battery_kw / eff.dc_to_dc;
            s.clipped_to_battery_kw = s.pv_clipped_kw.min(need);
            need -= s.clipped_to_battery_kw;
            s.pv_to_battery_kw = pv_surplus.min(need);
            need -= s.pv_to_battery_kw;
            pv_surplus -= s.pv_to_battery_kw;
            s.grid_to_battery_kw = need / eff.ac_to_dc;
            s.conversion_loss_kw = s.clipped_to_battery_kw
                + s.pv_to_battery_kw
                + s.grid_to_battery_kw
                + s.battery_kw;
        } else if s.battery_kw > 0.0 {
            let supply = s.battery_kw * eff.dc_to_dc * eff.dc_to_ac;
            s.battery_to_load_kw = supply.min(unmet_load);
            s.battery_to_grid_kw = supply - s.battery_to_load_kw;
            unmet_load -= s.battery_to_load_kw;
            s.conversion_loss_kw = s.battery_kw - supply;
        }

        s.pv_to_load_kw = pv_to_load;
        s.pv_to_grid_kw = pv_surplus;
        s.grid_to_load_kw = unmet_load;
    }
}

impl PowerFlow for BatteryPowerFlow {
    fn state(&self) -> &PowerFlowState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PowerFlowState {
        &mut self.state
    }

    fn initialize(&mut self) {
        let s = &mut self.state;
        s.clear_flows();

        if s.can_discharge && s.pv_kw < s.load_kw {
            // the constraint layer trims whatever the load cannot absorb
            s.battery_kw = s.battery_discharge_max_kw;
        } else if s.pv_kw > s.load_kw {
            if s.can_pv_charge {
                let clipped = if s.can_clip_charge { s.pv_clipped_kw } else { 0.0 };
                s.battery_kw = -(s.pv_kw - s.load_kw + clipped);
            }
            if s.can_grid_charge {
                s.battery_kw = -s.battery_charge_max_kw;
            }
        } else if s.can_grid_charge {
            s.battery_kw = -s.battery_charge_max_kw;
        }
    }

    fn calculate(&mut self) {
        self.state.clear_sub_flows();
        match self.connection {
            ConnectionMode::Ac => self.calculate_ac(),
            ConnectionMode::Dc => self.calculate_dc(),
        }

        let s = &mut self.state;
        s.snap_to_zero();
        s.grid_kw =
            s.pv_to_grid_kw + s.battery_to_grid_kw - s.grid_to_load_kw - s.grid_to_battery_kw;
        s.generated_kw = s.pv_to_load_kw + s.pv_to_grid_kw + s.battery_to_load_kw
            + s.battery_to_grid_kw
            - s.grid_to_battery_kw;
    }
}
