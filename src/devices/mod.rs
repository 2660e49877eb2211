//! Battery collaborator contract and the synthetic device models that feed
//! the dispatch loop.

/// Residential base-load profile generator.
pub mod baseload;
/// Reference coulomb-counting battery.
pub mod battery;
/// Solar photovoltaic generation with inverter clipping.
pub mod solar;
pub mod types;

pub use baseload::BaseLoad;
pub use battery::{BatteryState, SimpleBattery};
pub use solar::{PvOutput, SolarPv};
pub use types::BatteryModel;
