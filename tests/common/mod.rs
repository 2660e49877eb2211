//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use battery_dispatch::devices::BatteryModel;
use battery_dispatch::dispatch::{
    DispatchConfig, DispatchPolicy, MeterPosition, PowerFlow, RestrictionMode, StepInput,
};

/// Battery stub with a fixed voltage and SOC.
///
/// `run` accepts the requested current, optionally clamped to
/// `accept_limit_a`, and never moves the SOC. Every call to `run` is
/// counted, including rolled-back trials.
#[derive(Debug, Clone)]
pub struct StubBattery {
    pub voltage: f64,
    pub soc: f64,
    pub capacity_ah: f64,
    pub accept_limit_a: Option<f64>,
    pub runs: usize,
    current: f64,
}

impl StubBattery {
    pub fn new(voltage: f64, soc: f64, capacity_ah: f64) -> Self {
        Self {
            voltage,
            soc,
            capacity_ah,
            accept_limit_a: None,
            runs: 0,
            current: 0.0,
        }
    }
}

impl BatteryModel for StubBattery {
    type Snapshot = f64;

    fn run(&mut self, _index: usize, current: f64) {
        self.runs += 1;
        self.current = match self.accept_limit_a {
            Some(limit) => current.clamp(-limit, limit),
            None => current,
        };
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn voltage(&self) -> f64 {
        self.voltage
    }

    fn voltage_nominal(&self) -> f64 {
        self.voltage
    }

    fn soc(&self) -> f64 {
        self.soc
    }

    fn charge_maximum(&self) -> f64 {
        self.capacity_ah
    }

    fn charge_maximum_thermal(&self) -> f64 {
        self.capacity_ah
    }

    fn snapshot(&self) -> f64 {
        self.current
    }

    fn restore(&mut self, snapshot: &f64) {
        self.current = *snapshot;
    }
}

/// Policy that replays a fixed list of desired powers (kW), repeating the
/// last entry once the list runs out.
#[derive(Debug, Clone)]
pub struct Scripted {
    powers: Vec<f64>,
    calls: usize,
}

impl Scripted {
    pub fn new(powers: Vec<f64>) -> Self {
        Self { powers, calls: 0 }
    }

    pub fn constant(kw: f64) -> Self {
        Self::new(vec![kw])
    }
}

impl DispatchPolicy for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn compute_desired_power<B: BatteryModel, F: PowerFlow>(
        &mut self,
        _input: &StepInput,
        _config: &DispatchConfig,
        _battery: &B,
        power_flow: &mut F,
    ) -> f64 {
        let state = power_flow.state_mut();
        state.can_pv_charge = true;
        state.can_grid_charge = true;
        state.can_discharge = true;

        let i = self.calls.min(self.powers.len().saturating_sub(1));
        self.calls += 1;
        self.powers.get(i).copied().unwrap_or(0.0)
    }
}

/// Hourly dispatch limits: SOC window 10..95 %, 100 A, 5 kW.
pub fn hourly_config() -> DispatchConfig {
    DispatchConfig {
        dt_hours: 1.0,
        soc_min: 10.0,
        soc_max: 95.0,
        restriction: RestrictionMode::Both,
        current_charge_max: 100.0,
        current_discharge_max: 100.0,
        power_charge_max: 5.0,
        power_discharge_max: 5.0,
        min_dwell_minutes: 0.0,
        max_iterations: 5,
        meter: MeterPosition::BehindTheMeter,
    }
}

/// Input for one hourly step.
pub fn input(hour_of_year: usize, pv_kw: f64, clipped_kw: f64, load_kw: f64) -> StepInput {
    StepInput {
        year: 0,
        hour_of_year,
        step: 0,
        pv_kw,
        pv_clipped_kw: clipped_kw,
        load_kw,
        desired_battery_kw: None,
    }
}
