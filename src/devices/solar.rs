use crate::devices::types::{daylight_frac, gaussian_noise};
use crate::sim::clock::{HOURS_PER_DAY, TimeIndex};
use rand::{SeedableRng, rngs::StdRng};

/// AC output of the array for one step, split at the inverter limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PvOutput {
    /// Power delivered through the inverter (kW).
    pub ac_kw: f64,
    /// DC power above the inverter rating that would be wasted (kW).
    pub clipped_kw: f64,
}

/// A solar PV generator with inverter clipping.
///
/// `SolarPv` creates a half-sine daylight profile between sunrise and sunset,
/// scaled by a seasonal factor that peaks at the summer solstice, with
/// multiplicative Gaussian noise for weather. DC output above the inverter's
/// AC rating is reported separately as clipped power.
#[derive(Debug, Clone)]
pub struct SolarPv {
    /// DC array rating (kW).
    pub kw_dc_peak: f64,

    /// Inverter AC rating (kW).
    pub inverter_ac_kw: f64,

    /// Sunrise as a fractional hour of day.
    pub sunrise_hour: f64,

    /// Sunset as a fractional hour of day.
    pub sunset_hour: f64,

    /// Standard deviation of the Gaussian noise as a fraction of output.
    pub noise_std: f64,

    steps_per_hour: usize,

    rng: StdRng,
}

impl SolarPv {
    /// Creates a new solar PV generator.
    ///
    /// # Arguments
    ///
    /// * `kw_dc_peak` - DC array rating in kW
    /// * `inverter_ac_kw` - Inverter AC rating in kW
    /// * `sunrise_hour` - Sunrise hour of day
    /// * `sunset_hour` - Sunset hour of day
    /// * `noise_std` - Relative noise standard deviation (e.g. 0.05)
    /// * `steps_per_hour` - Substeps per hour
    /// * `seed` - Random seed for reproducible noise generation
    ///
    /// # Panics
    ///
    /// Panics if `sunrise_hour >= sunset_hour`, `sunset_hour > 24`, or
    /// `steps_per_hour` is zero.
    pub fn new(
        kw_dc_peak: f64,
        inverter_ac_kw: f64,
        sunrise_hour: f64,
        sunset_hour: f64,
        noise_std: f64,
        steps_per_hour: usize,
        seed: u64,
    ) -> Self {
        assert!(sunrise_hour < sunset_hour && sunset_hour <= HOURS_PER_DAY as f64);
        assert!(steps_per_hour > 0);
        Self {
            kw_dc_peak: kw_dc_peak.max(0.0),
            inverter_ac_kw: inverter_ac_kw.max(0.0),
            sunrise_hour,
            sunset_hour,
            noise_std: noise_std.max(0.0),
            steps_per_hour,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn seasonal_factor(day_of_year: usize) -> f64 {
        let angle = 2.0 * std::f64::consts::PI * (day_of_year as f64 - 172.0) / 365.0;
        0.75 + 0.25 * angle.cos()
    }

    /// Output at one step, using the midpoint of the step as its time.
    pub fn output(&mut self, t: TimeIndex) -> PvOutput {
        let hour = t.hour_of_day() as f64 + (t.step as f64 + 0.5) / self.steps_per_hour as f64;
        let frac = daylight_frac(hour, self.sunrise_hour, self.sunset_hour);
        if frac <= 0.0 {
            return PvOutput {
                ac_kw: 0.0,
                clipped_kw: 0.0,
            };
        }

        let season = Self::seasonal_factor(t.hour_of_year / HOURS_PER_DAY);
        let noise_mult = 1.0 + gaussian_noise(&mut self.rng, self.noise_std);
        let dc_kw = (self.kw_dc_peak * frac * season * noise_mult).max(0.0);

        PvOutput {
            ac_kw: dc_kw.min(self.inverter_ac_kw),
            clipped_kw: (dc_kw - self.inverter_ac_kw).max(0.0),
        }
    }

    /// Generates `(ac_kw, clipped_kw)` series for `total_steps` steps.
    pub fn series(&mut self, total_steps: usize) -> (Vec<f64>, Vec<f64>) {
        let mut ac = Vec::with_capacity(total_steps);
        let mut clipped = Vec::with_capacity(total_steps);
        for timestep in 0..total_steps {
            let out = self.output(TimeIndex::from_timestep(timestep, self.steps_per_hour));
            ac.push(out.ac_kw);
            clipped.push(out.clipped_kw);
        }
        (ac, clipped)
    }
}
