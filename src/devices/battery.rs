use crate::devices::types::BatteryModel;

/// Mutable part of a [`SimpleBattery`], captured for dispatch rollback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryState {
    /// Stored charge (Ah).
    pub charge_ah: f64,
    /// Current accepted by the last run (A, positive = discharge).
    pub current: f64,
    /// Terminal voltage after the last run (V).
    pub voltage: f64,
}

/// A coulomb-counting battery with a linear voltage curve.
///
/// `SimpleBattery` is the reference [`BatteryModel`] used by the engine and
/// tests. It tracks charge in amp-hours, applies a coulombic efficiency when
/// charging, and clamps the accepted current so stored charge never leaves
/// `[0, capacity]`.
///
/// # Current Convention
/// - Positive current: discharging
/// - Negative current: charging
#[derive(Debug, Clone)]
pub struct SimpleBattery {
    /// Nameplate capacity (Ah).
    pub capacity_ah: f64,

    /// Voltage at 50% SOC (V).
    pub nominal_voltage: f64,

    /// Fractional voltage change between 50% and 0% or 100% SOC.
    pub voltage_swing: f64,

    /// Coulombic efficiency applied to charging current (0..1.0).
    pub charge_efficiency: f64,

    /// Capacity lost per full cycle (%).
    pub cycle_damage_pct: f64,

    /// Duration of one timestep in hours.
    dt_hours: f64,

    state: BatteryState,
}

impl SimpleBattery {
    /// Creates a new battery.
    ///
    /// # Arguments
    ///
    /// * `capacity_ah` - Capacity in Ah (must be > 0)
    /// * `nominal_voltage` - Voltage at 50% SOC (must be > 0)
    /// * `initial_soc` - Initial SOC in percent (0 to 100)
    /// * `dt_hours` - Timestep duration in hours (must be > 0)
    ///
    /// # Panics
    ///
    /// Panics if any argument is out of range.
    pub fn new(capacity_ah: f64, nominal_voltage: f64, initial_soc: f64, dt_hours: f64) -> Self {
        assert!(capacity_ah > 0.0, "capacity_ah must be > 0");
        assert!(nominal_voltage > 0.0, "nominal_voltage must be > 0");
        assert!((0.0..=100.0).contains(&initial_soc), "initial_soc must be in [0, 100]");
        assert!(dt_hours > 0.0, "dt_hours must be > 0");

        let mut battery = Self {
            capacity_ah,
            nominal_voltage,
            voltage_swing: 0.0,
            charge_efficiency: 1.0,
            cycle_damage_pct: 0.0,
            dt_hours,
            state: BatteryState {
                charge_ah: capacity_ah * initial_soc * 0.01,
                current: 0.0,
                voltage: nominal_voltage,
            },
        };
        battery.state.voltage = battery.voltage_at(initial_soc);
        battery
    }

    /// Sets the coulombic charging efficiency.
    ///
    /// # Panics
    ///
    /// Panics if `eta` is not in `(0, 1]`.
    pub fn with_charge_efficiency(mut self, eta: f64) -> Self {
        assert!(eta > 0.0 && eta <= 1.0, "charge efficiency must be in (0, 1]");
        self.charge_efficiency = eta;
        self
    }

    /// Sets the voltage swing and refreshes the terminal voltage.
    pub fn with_voltage_swing(mut self, swing: f64) -> Self {
        self.voltage_swing = swing.clamp(0.0, 0.5);
        self.state.voltage = self.voltage_at(self.soc());
        self
    }

    /// Sets the capacity lost per full cycle (%).
    pub fn with_cycle_damage_pct(mut self, pct: f64) -> Self {
        self.cycle_damage_pct = pct.max(0.0);
        self
    }

    fn voltage_at(&self, soc: f64) -> f64 {
        self.nominal_voltage * (1.0 + self.voltage_swing * (soc - 50.0) / 50.0)
    }
}

impl BatteryModel for SimpleBattery {
    type Snapshot = BatteryState;

    fn run(&mut self, _index: usize, current: f64) {
        let dt = self.dt_hours;
        let q = self.state.charge_ah;

        let accepted = if current > 0.0 {
            current.min(q / dt)
        } else if current < 0.0 {
            let room = (self.capacity_ah - q) / (dt * self.charge_efficiency);
            current.max(-room)
        } else {
            0.0
        };

        let delta = if accepted > 0.0 {
            -accepted * dt
        } else {
            -accepted * dt * self.charge_efficiency
        };
        let charge_ah = (q + delta).clamp(0.0, self.capacity_ah);

        self.state.charge_ah = charge_ah;
        self.state.current = accepted;
        self.state.voltage = self.voltage_at(100.0 * charge_ah / self.capacity_ah);
    }

    fn current(&self) -> f64 {
        self.state.current
    }

    fn voltage(&self) -> f64 {
        self.state.voltage
    }

    fn voltage_nominal(&self) -> f64 {
        self.nominal_voltage
    }

    fn soc(&self) -> f64 {
        100.0 * self.state.charge_ah / self.capacity_ah
    }

    fn charge_maximum(&self) -> f64 {
        self.capacity_ah
    }

    fn charge_maximum_thermal(&self) -> f64 {
        self.capacity_ah
    }

    fn snapshot(&self) -> BatteryState {
        self.state
    }

    fn restore(&mut self, snapshot: &BatteryState) {
        self.state = *snapshot;
    }

    fn cycle_damage_pct(&self) -> f64 {
        self.cycle_damage_pct
    }
}
