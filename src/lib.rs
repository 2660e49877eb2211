//! Per-timestep battery dispatch for PV + storage systems.
//!
//! A [`dispatch::Dispatcher`] runs one policy (manual schedule, peak
//! shaving or economic) through an iterative constraint loop against any
//! [`devices::BatteryModel`]. The [`sim`] module drives it over time and
//! [`config`] builds complete runs from TOML scenarios.

#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod devices;
pub mod dispatch;
pub mod forecast;
pub mod io;
/// Simulation engine, calendar, schedules and reporting.
pub mod sim;
