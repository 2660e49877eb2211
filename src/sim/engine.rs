//! Simulation engine that steps a battery through a dispatch policy.

use tracing::info;

use crate::devices::BatteryModel;
use crate::dispatch::{
    BatteryMetrics, BatteryPowerFlow, DispatchPolicy, Dispatcher, PowerFlow, StepInput,
};

use super::clock::{Clock, TimeIndex};
use super::types::{SimConfig, SiteSeries, StepResult};

/// Simulation engine owning the battery, its dispatcher and the site series.
///
/// Generic over the policy and battery model for static dispatch.
pub struct Engine<P: DispatchPolicy, B: BatteryModel, F: PowerFlow = BatteryPowerFlow> {
    config: SimConfig,
    dispatcher: Dispatcher<P, F>,
    battery: B,
    site: SiteSeries,
    metrics: BatteryMetrics,
    year: usize,
}

impl<P: DispatchPolicy, B: BatteryModel, F: PowerFlow> Engine<P, B, F> {
    /// Creates a new simulation engine.
    ///
    /// # Arguments
    ///
    /// * `config` - Simulation configuration
    /// * `dispatcher` - Dispatcher with its policy and forecasts installed
    /// * `battery` - Battery model, mutated in place each step
    /// * `site` - PV, clipped PV and load series
    pub fn new(
        config: SimConfig,
        dispatcher: Dispatcher<P, F>,
        battery: B,
        site: SiteSeries,
    ) -> Self {
        let metrics = BatteryMetrics::new(config.dt_hours);
        Self {
            config,
            dispatcher,
            battery,
            site,
            metrics,
            year: 0,
        }
    }

    /// Executes one simulation timestep and returns the result.
    pub fn step(&mut self, t: usize) -> StepResult {
        self.step_at(TimeIndex::from_timestep(t, self.config.steps_per_hour))
    }

    fn step_at(&mut self, time: TimeIndex) -> StepResult {
        let t = time.timestep;
        if time.year != self.year {
            self.year = time.year;
            self.metrics.new_year();
            info!(year = time.year, "starting simulation year");
        }

        let (pv_kw, clipped_kw, load_kw) = self.site.values_at(t);
        let input = StepInput {
            year: time.year,
            hour_of_year: time.hour_of_year,
            step: time.step,
            pv_kw,
            pv_clipped_kw: clipped_kw,
            load_kw,
            desired_battery_kw: None,
        };

        let outcome = self.dispatcher.dispatch(&mut self.battery, &input);
        let flows = self.dispatcher.flows();
        self.metrics.record(flows);

        StepResult {
            timestep: t,
            year: time.year,
            hour_of_year: time.hour_of_year,
            step: time.step,
            time_hr: t as f64 * self.config.dt_hours,
            pv_kw,
            clipped_kw,
            load_kw,
            desired_kw: outcome.desired_kw,
            battery_kw: outcome.battery_kw,
            current_a: outcome.current,
            soc_pct: self.battery.soc(),
            grid_kw: flows.grid_kw,
            pv_to_load_kw: flows.pv_to_load_kw,
            pv_to_battery_kw: flows.pv_to_battery_kw,
            pv_to_grid_kw: flows.pv_to_grid_kw,
            grid_to_battery_kw: flows.grid_to_battery_kw,
            grid_to_load_kw: flows.grid_to_load_kw,
            battery_to_load_kw: flows.battery_to_load_kw,
            battery_to_grid_kw: flows.battery_to_grid_kw,
            charging: self.dispatcher.charging(),
            iterations: outcome.iterations,
            held: outcome.held,
        }
    }

    /// Executes all timesteps and returns the complete step record vector.
    pub fn run(&mut self) -> Vec<StepResult> {
        let total = self.config.total_steps();
        info!(
            steps = total,
            policy = self.dispatcher.policy().name(),
            "simulation started"
        );
        let mut results = Vec::with_capacity(total);
        Clock::new(total, self.config.steps_per_hour).run(|time| results.push(self.step_at(time)));
        info!(
            steps = results.len(),
            soc_pct = self.battery.soc(),
            efficiency_pct = self.metrics.average_efficiency_pct(),
            "simulation finished"
        );
        results
    }

    /// Returns a reference to the battery.
    pub fn battery(&self) -> &B {
        &self.battery
    }

    pub fn dispatcher(&self) -> &Dispatcher<P, F> {
        &self.dispatcher
    }

    pub fn metrics(&self) -> &BatteryMetrics {
        &self.metrics
    }

    /// Returns a reference to the simulation configuration.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::SimpleBattery;
    use crate::dispatch::{AutomaticMode, ChargePermissions, DispatchConfig, PeakShavingPolicy};

    fn engine(days: usize) -> Engine<PeakShavingPolicy, SimpleBattery> {
        let sim = SimConfig::new(1, days, 0);
        let mut load = vec![2.0; 24];
        load[18] = 8.0;
        let mut policy =
            PeakShavingPolicy::new(AutomaticMode::PeakShaving, ChargePermissions::default(), 1);
        policy.set_load_forecast(load.clone());
        let dispatcher = Dispatcher::new(DispatchConfig::default(), policy);
        let battery = SimpleBattery::new(100.0, 100.0, 80.0, 1.0);
        let site = SiteSeries {
            pv_kw: vec![0.0],
            clipped_kw: vec![0.0],
            load_kw: load,
        };
        Engine::new(sim, dispatcher, battery, site)
    }

    #[test]
    fn run_produces_one_result_per_step() {
        let mut e = engine(2);
        let results = e.run();
        assert_eq!(results.len(), 48);
        assert_eq!(results[25].hour_of_year, 25);
    }

    #[test]
    fn peak_hour_is_shaved() {
        let mut e = engine(1);
        let results = e.run();
        let peak = &results[18];
        assert!(peak.battery_kw > 0.0);
        assert!(peak.iterations < DispatchConfig::default().max_iterations);
        assert!(-peak.grid_kw < 8.0);
        assert!(e.metrics().lifetime().discharge > 0.0);
    }

    #[test]
    fn soc_stays_in_window() {
        let mut e = engine(3);
        let cfg = DispatchConfig::default();
        for r in e.run() {
            assert!(r.soc_pct >= cfg.soc_min - 0.01, "soc {} at {}", r.soc_pct, r.timestep);
            assert!(r.soc_pct <= cfg.soc_max + 0.01, "soc {} at {}", r.soc_pct, r.timestep);
        }
    }
}
