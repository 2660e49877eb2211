//! Runtime choice between the dispatch policies.

use crate::devices::BatteryModel;

use super::constraints::ConstraintContext;
use super::core::DispatchPolicy;
use super::economic::EconomicPolicy;
use super::manual::ManualPolicy;
use super::peak_shaving::PeakShavingPolicy;
use super::power_flow::PowerFlow;
use super::types::{DispatchConfig, StepInput};

/// One of the built-in policies, chosen by configuration.
#[derive(Debug, Clone)]
pub enum DispatchStrategy {
    Manual(ManualPolicy),
    PeakShaving(PeakShavingPolicy),
    Economic(EconomicPolicy),
}

impl DispatchStrategy {
    /// Installs forecasts for the policies that use them.
    ///
    /// Manual dispatch ignores all three series; economic dispatch only
    /// reads the clipped-PV forecast.
    pub fn set_forecasts(&mut self, pv_kw: Vec<f64>, clipped_kw: Vec<f64>, load_kw: Vec<f64>) {
        match self {
            Self::Manual(_) => {}
            Self::PeakShaving(p) => {
                p.set_pv_forecast(pv_kw);
                p.set_load_forecast(load_kw);
            }
            Self::Economic(p) => p.set_clipped_forecast(clipped_kw),
        }
    }

    /// Installs an externally supplied battery power series.
    ///
    /// Returns `false` for manual dispatch, which has no custom mode.
    pub fn set_custom_dispatch(&mut self, battery_kw: Vec<f64>) -> bool {
        match self {
            Self::Manual(_) => false,
            Self::PeakShaving(p) => {
                p.set_custom_dispatch(battery_kw);
                true
            }
            Self::Economic(p) => {
                p.set_custom_dispatch(battery_kw);
                true
            }
        }
    }
}

impl From<ManualPolicy> for DispatchStrategy {
    fn from(p: ManualPolicy) -> Self {
        Self::Manual(p)
    }
}

impl From<PeakShavingPolicy> for DispatchStrategy {
    fn from(p: PeakShavingPolicy) -> Self {
        Self::PeakShaving(p)
    }
}

impl From<EconomicPolicy> for DispatchStrategy {
    fn from(p: EconomicPolicy) -> Self {
        Self::Economic(p)
    }
}

impl DispatchPolicy for DispatchStrategy {
    fn name(&self) -> &'static str {
        match self {
            Self::Manual(p) => p.name(),
            Self::PeakShaving(p) => p.name(),
            Self::Economic(p) => p.name(),
        }
    }

    fn compute_desired_power<B: BatteryModel, F: PowerFlow>(
        &mut self,
        input: &StepInput,
        config: &DispatchConfig,
        battery: &B,
        power_flow: &mut F,
    ) -> f64 {
        match self {
            Self::Manual(p) => p.compute_desired_power(input, config, battery, power_flow),
            Self::PeakShaving(p) => p.compute_desired_power(input, config, battery, power_flow),
            Self::Economic(p) => p.compute_desired_power(input, config, battery, power_flow),
        }
    }

    fn check_constraints(&self, ctx: &ConstraintContext<'_>, current: &mut f64) -> bool {
        match self {
            Self::Manual(p) => p.check_constraints(ctx, current),
            Self::PeakShaving(p) => p.check_constraints(ctx, current),
            Self::Economic(p) => p.check_constraints(ctx, current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::manual::DispatchProfile;
    use crate::dispatch::peak_shaving::AutomaticMode;
    use crate::dispatch::types::ChargePermissions;
    use crate::sim::schedule::{MonthHourSchedule, WeekSchedule};

    #[test]
    fn names_follow_variant() {
        let manual = ManualPolicy::new(
            WeekSchedule::same_every_day(MonthHourSchedule::uniform(1)),
            vec![DispatchProfile::default()],
        )
        .unwrap();
        let mut strategy = DispatchStrategy::from(manual);
        assert_eq!(strategy.name(), "manual");
        assert!(!strategy.set_custom_dispatch(vec![1.0]));

        let mut strategy: DispatchStrategy =
            PeakShavingPolicy::new(AutomaticMode::Custom, ChargePermissions::default(), 1).into();
        assert_eq!(strategy.name(), "peak_shaving");
        assert!(strategy.set_custom_dispatch(vec![1.0]));
    }
}
