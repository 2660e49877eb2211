use crate::devices::types::gaussian_noise;
use crate::sim::clock::{HOURS_PER_DAY, TimeIndex};
use rand::{SeedableRng, rngs::StdRng};

/// A baseload generator that models daily electricity consumption patterns.
///
/// `BaseLoad` creates a sinusoidal power demand pattern with configurable
/// baseline, amplitude, phase, and random noise. Demand is never negative.
///
/// # Examples
///
/// ```
/// use battery_dispatch::devices::baseload::BaseLoad;
///
/// let mut load = BaseLoad::new(
///     1.0,   // base_kw - average consumption
///     0.5,   // amp_kw - daily variation
///     0.0,   // phase_rad - no phase shift
///     0.0,   // noise_std - no random variation
///     1,     // steps_per_hour - hourly resolution
///     42,    // seed - for reproducible randomness
/// );
///
/// let series = load.series(24);
/// assert_eq!(series.len(), 24);
/// assert!(series.iter().all(|kw| *kw >= 0.0));
/// ```
#[derive(Debug, Clone)]
pub struct BaseLoad {
    /// Baseline power consumption in kilowatts
    pub base_kw: f64,

    /// Amplitude of the sinusoidal variation in kilowatts
    pub amp_kw: f64,

    /// Phase offset of the sinusoidal pattern in radians
    pub phase_rad: f64,

    /// Standard deviation of the Gaussian noise in kilowatts
    pub noise_std: f64,

    /// Number of substeps per hour
    pub steps_per_hour: usize,

    rng: StdRng,
}

impl BaseLoad {
    /// Creates a new baseload generator.
    ///
    /// # Arguments
    ///
    /// * `base_kw` - The baseline power consumption in kilowatts
    /// * `amp_kw` - The amplitude of sinusoidal daily variation in kilowatts
    /// * `phase_rad` - The phase offset in radians
    /// * `noise_std` - The standard deviation of Gaussian noise in kilowatts
    /// * `steps_per_hour` - Substeps per hour (values below 1 are raised to 1)
    /// * `seed` - Random seed for reproducible noise generation
    pub fn new(
        base_kw: f64,
        amp_kw: f64,
        phase_rad: f64,
        noise_std: f64,
        steps_per_hour: usize,
        seed: u64,
    ) -> Self {
        Self {
            base_kw,
            amp_kw,
            phase_rad,
            noise_std,
            steps_per_hour: steps_per_hour.max(1),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Demand (kW) at one step.
    pub fn demand_kw(&mut self, t: TimeIndex) -> f64 {
        let hour = t.hour_of_day() as f64 + t.step as f64 / self.steps_per_hour as f64;
        let angle = 2.0 * std::f64::consts::PI * hour / HOURS_PER_DAY as f64 + self.phase_rad;
        let noise = gaussian_noise(&mut self.rng, self.noise_std);
        (self.base_kw + self.amp_kw * angle.sin() + noise).max(0.0)
    }

    /// Generates a demand series for `total_steps` steps.
    pub fn series(&mut self, total_steps: usize) -> Vec<f64> {
        (0..total_steps)
            .map(|timestep| self.demand_kw(TimeIndex::from_timestep(timestep, self.steps_per_hour)))
            .collect()
    }
}
