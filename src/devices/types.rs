//! Collaborator contracts and helpers shared by the device models.

use rand::{Rng, rngs::StdRng};

/// A battery model driven by the dispatch loop.
///
/// Current follows the dispatch convention: positive discharges, negative
/// charges. SOC is a percentage in `[0, 100]`. `run` mutates the model in
/// place, so the dispatch loop takes a snapshot before trial runs and
/// restores it whenever a trial current is rejected.
pub trait BatteryModel {
    /// Deep copy of everything `run` can mutate.
    type Snapshot;

    /// Applies `current` (A) for one timestep at absolute step `index`.
    fn run(&mut self, index: usize, current: f64);

    /// Current (A) actually accepted by the last `run`.
    fn current(&self) -> f64;

    /// Terminal voltage (V) after the last `run`.
    fn voltage(&self) -> f64;

    /// Nameplate voltage (V).
    fn voltage_nominal(&self) -> f64;

    /// State of charge (%).
    fn soc(&self) -> f64;

    /// Maximum charge capacity (Ah).
    fn charge_maximum(&self) -> f64;

    /// Maximum charge capacity at the present temperature (Ah).
    fn charge_maximum_thermal(&self) -> f64;

    /// Captures the mutable state.
    fn snapshot(&self) -> Self::Snapshot;

    /// Restores a state captured by [`BatteryModel::snapshot`].
    fn restore(&mut self, snapshot: &Self::Snapshot);

    /// Energy (kWh) needed to bring the battery up to `soc_max` percent.
    fn energy_to_fill(&self, soc_max: f64) -> f64 {
        let ah = (soc_max - self.soc()) * 0.01 * self.charge_maximum();
        (ah * self.voltage() * 0.001).max(0.0)
    }

    /// Capacity lost per full cycle at the present depth of discharge (%).
    fn cycle_damage_pct(&self) -> f64 {
        0.0
    }
}

/// Fraction of peak irradiance at a (fractional) hour of the day.
///
/// Half-sine between sunrise and sunset, zero outside.
pub fn daylight_frac(hour: f64, sunrise_hour: f64, sunset_hour: f64) -> f64 {
    if hour < sunrise_hour || hour >= sunset_hour || sunset_hour <= sunrise_hour {
        return 0.0;
    }
    let x = (hour - sunrise_hour) / (sunset_hour - sunrise_hour);
    (std::f64::consts::PI * x).sin().max(0.0)
}

/// Utility function to generate Gaussian noise using Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and specified standard deviation
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-9, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}
