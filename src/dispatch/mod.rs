//! Battery dispatch: the shared iteration loop, its constraint layers and
//! the policies that pick a desired battery power each step.

pub mod constraints;
pub mod core;
/// Front-of-meter economic dispatch.
pub mod economic;
/// Schedule-driven dispatch.
pub mod manual;
pub mod metrics;
/// Behind-the-meter peak shaving.
pub mod peak_shaving;
pub mod power_flow;
pub mod strategy;
pub mod types;

/// Absolute tolerance for power (kW), current (A) and SOC (%) comparisons.
pub const TOLERANCE: f64 = 0.001;

/// Relative tolerance on power limits, and absolute tolerance on PV export.
pub const LOW_TOLERANCE: f64 = 0.01;

/// Watts to kilowatts.
pub const W_TO_KW: f64 = 0.001;

pub use self::core::{DispatchOutcome, DispatchPolicy, Dispatcher};
pub use economic::{CycleCost, EconomicEfficiencies, EconomicPolicy};
pub use manual::{DispatchProfile, ManualPolicy};
pub use metrics::BatteryMetrics;
pub use peak_shaving::{AutomaticMode, PeakShavingPolicy};
pub use power_flow::{
    BatteryPowerFlow, ConnectionMode, ConversionEfficiency, PowerFlow, PowerFlowState,
};
pub use strategy::DispatchStrategy;
pub use types::{
    ChargePermissions, DispatchConfig, MeterPosition, RestrictionMode, StepInput,
    DEFAULT_MAX_ITERATIONS,
};
