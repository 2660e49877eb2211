/// Simulation clock and calendar lookups.
pub mod clock;
pub mod engine;
pub mod kpi;
/// Month-by-hour schedules for dispatch profiles and prices.
pub mod schedule;
pub mod types;
