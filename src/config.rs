//! TOML-based scenario configuration, preset definitions and the builders
//! that turn a scenario into a ready-to-run [`Engine`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::devices::{BaseLoad, SimpleBattery, SolarPv};
use crate::dispatch::{
    AutomaticMode, BatteryPowerFlow, ChargePermissions, ConnectionMode, ConversionEfficiency,
    CycleCost, DEFAULT_MAX_ITERATIONS, DispatchConfig, DispatchProfile, DispatchStrategy,
    Dispatcher, EconomicEfficiencies, EconomicPolicy, ManualPolicy, MeterPosition,
    PeakShavingPolicy, RestrictionMode,
};
use crate::forecast::{ForecastMode, extend_for_look_ahead};
use crate::io::profile;
use crate::sim::clock::HOURS_PER_DAY;
use crate::sim::engine::Engine;
use crate::sim::schedule::{MonthHourSchedule, PriceSchedule, ScheduleError, WeekSchedule};
use crate::sim::types::{SimConfig, SiteSeries};

/// Configuration error with field path and constraint description.
#[derive(Debug, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"dispatch.soc_min"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults. Load from TOML with
/// [`ScenarioConfig::from_toml_file`] or start from a named preset with
/// [`ScenarioConfig::from_preset`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation timing and global parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Battery model parameters.
    #[serde(default)]
    pub battery: BatteryConfig,
    /// Dispatch limits and policy selection.
    #[serde(default)]
    pub dispatch: DispatchSection,
    /// Synthetic PV parameters, used when no profile CSV is given.
    #[serde(default)]
    pub solar: SolarConfig,
    /// Synthetic load parameters, used when no profile CSV is given.
    #[serde(default)]
    pub load: LoadConfig,
    /// Optional CSV inputs.
    #[serde(default)]
    pub profiles: ProfilesConfig,
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Substeps per hour (must be > 0).
    pub steps_per_hour: usize,
    /// Number of days to simulate (must be > 0).
    pub days: usize,
    /// Master random seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            steps_per_hour: 1,
            days: 7,
            seed: 42,
        }
    }
}

/// Battery model parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryConfig {
    /// Capacity (Ah).
    pub capacity_ah: f64,
    /// Voltage at 50% SOC (V).
    pub nominal_voltage: f64,
    /// Initial SOC (%).
    pub initial_soc: f64,
    /// Fractional voltage change between 50% and 0%/100% SOC.
    pub voltage_swing: f64,
    /// Coulombic charging efficiency (0..1.0).
    pub charge_efficiency: f64,
    /// Capacity lost per full cycle (%).
    pub cycle_damage_pct: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_ah: 100.0,
            nominal_voltage: 100.0,
            initial_soc: 50.0,
            voltage_swing: 0.0,
            charge_efficiency: 0.98,
            cycle_damage_pct: 0.01,
        }
    }
}

impl BatteryConfig {
    /// Nameplate energy at nominal voltage (kWh).
    pub fn capacity_kwh(&self) -> f64 {
        self.capacity_ah * self.nominal_voltage * 0.001
    }
}

/// Which dispatch policy drives the battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Manual,
    PeakShaving,
    Economic,
}

/// Dispatch limits and policy selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSection {
    pub strategy: StrategyKind,
    /// Minimum SOC (%).
    pub soc_min: f64,
    /// Maximum SOC (%).
    pub soc_max: f64,
    pub restriction: RestrictionMode,
    /// Maximum charging current (A).
    pub current_charge_max: f64,
    /// Maximum discharging current (A).
    pub current_discharge_max: f64,
    /// Maximum charging power (kW).
    pub power_charge_max: f64,
    /// Maximum discharging power (kW).
    pub power_discharge_max: f64,
    /// Minimum minutes in one direction before switching.
    pub min_dwell_minutes: f64,
    /// Battery runs allowed per timestep.
    pub max_iterations: usize,
    pub meter: MeterPosition,
    pub connection: ConnectionMode,
    pub efficiency: ConversionEfficiency,
    pub manual: ManualConfig,
    pub automatic: AutomaticConfig,
    pub economic: EconomicConfig,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Manual,
            soc_min: 10.0,
            soc_max: 95.0,
            restriction: RestrictionMode::Both,
            current_charge_max: 50.0,
            current_discharge_max: 50.0,
            power_charge_max: 5.0,
            power_discharge_max: 5.0,
            min_dwell_minutes: 0.0,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            meter: MeterPosition::BehindTheMeter,
            connection: ConnectionMode::Ac,
            efficiency: ConversionEfficiency::default(),
            manual: ManualConfig::default(),
            automatic: AutomaticConfig::default(),
            economic: EconomicConfig::default(),
        }
    }
}

/// Manual dispatch schedule.
///
/// Schedules are 12 rows (months) of 24 profile ids (hours). An empty
/// schedule uses profile 1 for every hour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManualConfig {
    pub weekday_schedule: Vec<Vec<usize>>,
    pub weekend_schedule: Vec<Vec<usize>>,
    pub profiles: Vec<DispatchProfile>,
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            weekday_schedule: Vec::new(),
            weekend_schedule: Vec::new(),
            profiles: vec![DispatchProfile::default()],
        }
    }
}

/// Settings shared by the automatic policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutomaticConfig {
    pub mode: AutomaticMode,
    pub can_charge: bool,
    pub can_clip_charge: bool,
    pub can_grid_charge: bool,
    /// Horizon of the economic price search (h).
    pub look_ahead_hours: usize,
    /// Hours between economic decisions.
    pub update_hours: f64,
    /// Per-step target grid power (kW); negative entries mean no target.
    pub target_power_csv: Option<PathBuf>,
    /// Per-step battery power for custom mode (kW).
    pub custom_dispatch_csv: Option<PathBuf>,
}

impl Default for AutomaticConfig {
    fn default() -> Self {
        Self {
            mode: AutomaticMode::PeakShaving,
            can_charge: true,
            can_clip_charge: false,
            can_grid_charge: false,
            look_ahead_hours: 24,
            update_hours: 1.0,
            target_power_csv: None,
            custom_dispatch_csv: None,
        }
    }
}

impl AutomaticConfig {
    fn permissions(&self) -> ChargePermissions {
        ChargePermissions {
            can_charge: self.can_charge,
            can_clip_charge: self.can_clip_charge,
            can_grid_charge: self.can_grid_charge,
        }
    }

    /// Forecast construction implied by the mode.
    pub fn forecast_mode(&self) -> ForecastMode {
        match self.mode {
            AutomaticMode::PeakShavingLookBehind => ForecastMode::LookBehind,
            _ => ForecastMode::LookAhead,
        }
    }
}

/// Price inputs for front-of-meter economic dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EconomicConfig {
    /// Inverter AC limit (kW); defaults to `solar.inverter_ac_kw`.
    pub inverter_ac_kw: Option<f64>,
    /// Base PPA sale price ($/kWh).
    pub ppa_price: f64,
    /// Time-of-delivery factor per period.
    pub ppa_factors: Vec<f64>,
    pub ppa_weekday_schedule: Vec<Vec<usize>>,
    pub ppa_weekend_schedule: Vec<Vec<usize>>,
    /// Energy purchase rate per period ($/kWh).
    pub purchase_rates: Vec<f64>,
    pub purchase_weekday_schedule: Vec<Vec<usize>>,
    pub purchase_weekend_schedule: Vec<Vec<usize>>,
    pub cycle_cost: CycleCost,
    pub efficiencies: EconomicEfficiencies,
}

impl Default for EconomicConfig {
    fn default() -> Self {
        Self {
            inverter_ac_kw: None,
            ppa_price: 0.08,
            ppa_factors: vec![1.0],
            ppa_weekday_schedule: Vec::new(),
            ppa_weekend_schedule: Vec::new(),
            purchase_rates: vec![0.10],
            purchase_weekday_schedule: Vec::new(),
            purchase_weekend_schedule: Vec::new(),
            cycle_cost: CycleCost::default(),
            efficiencies: EconomicEfficiencies::default(),
        }
    }
}

/// Synthetic PV parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolarConfig {
    /// DC array rating (kW).
    pub kw_dc_peak: f64,
    /// Inverter AC rating (kW).
    pub inverter_ac_kw: f64,
    /// Sunrise hour of day.
    pub sunrise_hour: f64,
    /// Sunset hour of day.
    pub sunset_hour: f64,
    /// Relative noise standard deviation.
    pub noise_std: f64,
}

impl Default for SolarConfig {
    fn default() -> Self {
        Self {
            kw_dc_peak: 5.0,
            inverter_ac_kw: 5.0,
            sunrise_hour: 6.0,
            sunset_hour: 18.0,
            noise_std: 0.05,
        }
    }
}

/// Synthetic load parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadConfig {
    /// Baseline consumption (kW).
    pub base_kw: f64,
    /// Sinusoidal amplitude (kW).
    pub amp_kw: f64,
    /// Phase offset (radians).
    pub phase_rad: f64,
    /// Gaussian noise standard deviation (kW).
    pub noise_std: f64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            base_kw: 2.0,
            amp_kw: 1.0,
            // peaks around 18:00
            phase_rad: std::f64::consts::PI,
            noise_std: 0.05,
        }
    }
}

/// Optional CSV inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfilesConfig {
    /// Site file with `pv_kw`, `load_kw` and optional `clipped_kw` columns.
    pub csv: Option<PathBuf>,
}

/// Builds 12 identical monthly rows using `base` everywhere and `period`
/// for hours `start..end`.
fn window_rows(base: usize, period: usize, start: usize, end: usize) -> Vec<Vec<usize>> {
    let row: Vec<usize> = (0..HOURS_PER_DAY)
        .map(|h| if (start..end).contains(&h) { period } else { base })
        .collect();
    vec![row; 12]
}

fn month_hour(rows: &[Vec<usize>]) -> Result<MonthHourSchedule, ScheduleError> {
    if rows.is_empty() {
        Ok(MonthHourSchedule::uniform(1))
    } else {
        MonthHourSchedule::from_rows(rows)
    }
}

fn week_schedule(
    field: &str,
    weekday: &[Vec<usize>],
    weekend: &[Vec<usize>],
    count: usize,
) -> Result<WeekSchedule, ConfigError> {
    let to_err = |e: ScheduleError| ConfigError::new(field, e.to_string());
    let schedule = WeekSchedule {
        weekday: month_hour(weekday).map_err(to_err)?,
        weekend: month_hour(weekend).map_err(to_err)?,
    };
    schedule.check_periods(count).map_err(to_err)?;
    Ok(schedule)
}

impl ScenarioConfig {
    /// Returns the manual time-of-use preset: PV charging all day and a
    /// 25% discharge window on weekday evenings.
    pub fn manual_tou() -> Self {
        Self {
            dispatch: DispatchSection {
                strategy: StrategyKind::Manual,
                manual: ManualConfig {
                    weekday_schedule: window_rows(1, 2, 17, 21),
                    weekend_schedule: Vec::new(),
                    profiles: vec![
                        DispatchProfile::default(),
                        DispatchProfile {
                            can_charge: false,
                            can_discharge: true,
                            discharge_percent: 25.0,
                            ..DispatchProfile::default()
                        },
                    ],
                },
                ..DispatchSection::default()
            },
            ..Self::default()
        }
    }

    /// Returns the peak-shaving preset: behind-the-meter battery with grid
    /// charging and a pronounced evening load peak.
    pub fn peak_shaving() -> Self {
        Self {
            dispatch: DispatchSection {
                strategy: StrategyKind::PeakShaving,
                automatic: AutomaticConfig {
                    mode: AutomaticMode::PeakShaving,
                    can_grid_charge: true,
                    ..AutomaticConfig::default()
                },
                ..DispatchSection::default()
            },
            solar: SolarConfig {
                kw_dc_peak: 3.0,
                inverter_ac_kw: 3.0,
                ..SolarConfig::default()
            },
            load: LoadConfig {
                base_kw: 3.0,
                amp_kw: 2.0,
                ..LoadConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the merchant PV preset: front-of-meter, DC-connected battery
    /// behind an undersized inverter, selling at an evening price premium.
    pub fn merchant_pv() -> Self {
        Self {
            battery: BatteryConfig {
                capacity_ah: 200.0,
                initial_soc: 20.0,
                ..BatteryConfig::default()
            },
            dispatch: DispatchSection {
                strategy: StrategyKind::Economic,
                meter: MeterPosition::FrontOfMeter,
                connection: ConnectionMode::Dc,
                power_charge_max: 8.0,
                power_discharge_max: 8.0,
                current_charge_max: 80.0,
                current_discharge_max: 80.0,
                automatic: AutomaticConfig {
                    mode: AutomaticMode::PeakShaving,
                    can_clip_charge: true,
                    look_ahead_hours: 24,
                    update_hours: 1.0,
                    ..AutomaticConfig::default()
                },
                economic: EconomicConfig {
                    ppa_price: 0.06,
                    ppa_factors: vec![1.0, 2.5],
                    ppa_weekday_schedule: window_rows(1, 2, 17, 22),
                    ppa_weekend_schedule: window_rows(1, 2, 17, 22),
                    ..EconomicConfig::default()
                },
                ..DispatchSection::default()
            },
            solar: SolarConfig {
                kw_dc_peak: 20.0,
                inverter_ac_kw: 8.0,
                ..SolarConfig::default()
            },
            load: LoadConfig {
                base_kw: 0.0,
                amp_kw: 0.0,
                noise_std: 0.0,
                ..LoadConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["manual_tou", "peak_shaving", "merchant_pv"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "manual_tou" => Ok(Self::manual_tou()),
            "peak_shaving" => Ok(Self::peak_shaving()),
            "merchant_pv" => Ok(Self::merchant_pv()),
            _ => Err(ConfigError::new(
                "preset",
                format!("unknown preset \"{name}\", available: {}", Self::PRESETS.join(", ")),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError::new(field, message));
            }
        };

        let s = &self.simulation;
        check(s.steps_per_hour > 0, "simulation.steps_per_hour", "must be > 0");
        check(s.days > 0, "simulation.days", "must be > 0");

        let b = &self.battery;
        check(b.capacity_ah > 0.0, "battery.capacity_ah", "must be > 0");
        check(b.nominal_voltage > 0.0, "battery.nominal_voltage", "must be > 0");
        check(
            (0.0..=100.0).contains(&b.initial_soc),
            "battery.initial_soc",
            "must be in [0, 100]",
        );
        check(
            b.charge_efficiency > 0.0 && b.charge_efficiency <= 1.0,
            "battery.charge_efficiency",
            "must be in (0, 1]",
        );
        check(
            (0.0..0.5).contains(&b.voltage_swing),
            "battery.voltage_swing",
            "must be in [0, 0.5)",
        );

        let d = &self.dispatch;
        check(
            (0.0..=100.0).contains(&d.soc_min) && (0.0..=100.0).contains(&d.soc_max),
            "dispatch.soc_min",
            "SOC limits must be in [0, 100]",
        );
        check(d.soc_min < d.soc_max, "dispatch.soc_min", "must be < dispatch.soc_max");
        for (field, value) in [
            ("dispatch.current_charge_max", d.current_charge_max),
            ("dispatch.current_discharge_max", d.current_discharge_max),
            ("dispatch.power_charge_max", d.power_charge_max),
            ("dispatch.power_discharge_max", d.power_discharge_max),
            ("dispatch.min_dwell_minutes", d.min_dwell_minutes),
        ] {
            check(value >= 0.0, field, "must be >= 0");
        }
        check(d.max_iterations > 0, "dispatch.max_iterations", "must be > 0");
        let eta = &d.efficiency;
        check(
            [eta.ac_to_dc, eta.dc_to_ac, eta.dc_to_dc]
                .iter()
                .all(|e| *e > 0.0 && *e <= 1.0),
            "dispatch.efficiency",
            "efficiencies must be in (0, 1]",
        );

        match d.strategy {
            StrategyKind::Manual => {
                check(
                    !d.manual.profiles.is_empty(),
                    "dispatch.manual.profiles",
                    "at least one profile is required",
                );
                for (i, p) in d.manual.profiles.iter().enumerate() {
                    check(
                        (0.0..=100.0).contains(&p.discharge_percent)
                            && (0.0..=100.0).contains(&p.grid_charge_percent),
                        &format!("dispatch.manual.profiles[{i}]"),
                        "percentages must be in [0, 100]",
                    );
                }
            }
            StrategyKind::PeakShaving => check(
                d.meter == MeterPosition::BehindTheMeter,
                "dispatch.meter",
                "peak shaving requires behind_the_meter",
            ),
            StrategyKind::Economic => {
                check(
                    d.meter == MeterPosition::FrontOfMeter,
                    "dispatch.meter",
                    "economic dispatch requires front_of_meter",
                );
                check(
                    !d.economic.ppa_factors.is_empty(),
                    "dispatch.economic.ppa_factors",
                    "at least one factor is required",
                );
                check(
                    !d.economic.purchase_rates.is_empty(),
                    "dispatch.economic.purchase_rates",
                    "at least one rate is required",
                );
                check(
                    d.automatic.mode != AutomaticMode::PeakShavingLookBehind,
                    "dispatch.automatic.mode",
                    "look-behind applies to peak shaving only",
                );
            }
        }
        if d.strategy != StrategyKind::Manual {
            check(
                d.automatic.mode != AutomaticMode::Custom
                    || d.automatic.custom_dispatch_csv.is_some(),
                "dispatch.automatic.custom_dispatch_csv",
                "required when mode is custom",
            );
            check(
                d.automatic.look_ahead_hours > 0,
                "dispatch.automatic.look_ahead_hours",
                "must be > 0",
            );
            check(d.automatic.update_hours > 0.0, "dispatch.automatic.update_hours", "must be > 0");
        }

        let sol = &self.solar;
        check(
            sol.sunrise_hour < sol.sunset_hour,
            "solar.sunrise_hour",
            "must be < solar.sunset_hour",
        );
        check(
            sol.sunset_hour <= HOURS_PER_DAY as f64,
            "solar.sunset_hour",
            "must be <= 24",
        );

        errors.extend(self.schedule_errors());
        errors
    }

    fn schedule_errors(&self) -> Vec<ConfigError> {
        let d = &self.dispatch;
        let mut errors = Vec::new();
        let checks = match d.strategy {
            StrategyKind::Manual => vec![(
                "dispatch.manual.schedule",
                &d.manual.weekday_schedule,
                &d.manual.weekend_schedule,
                d.manual.profiles.len(),
            )],
            StrategyKind::Economic => vec![
                (
                    "dispatch.economic.ppa_schedule",
                    &d.economic.ppa_weekday_schedule,
                    &d.economic.ppa_weekend_schedule,
                    d.economic.ppa_factors.len(),
                ),
                (
                    "dispatch.economic.purchase_schedule",
                    &d.economic.purchase_weekday_schedule,
                    &d.economic.purchase_weekend_schedule,
                    d.economic.purchase_rates.len(),
                ),
            ],
            StrategyKind::PeakShaving => Vec::new(),
        };
        for (field, weekday, weekend, count) in checks {
            if count == 0 {
                continue;
            }
            if let Err(e) = week_schedule(field, weekday, weekend, count) {
                errors.push(e);
            }
        }
        errors
    }

    /// Simulation timing derived from `[simulation]`.
    pub fn sim_config(&self) -> SimConfig {
        let s = &self.simulation;
        SimConfig::new(s.steps_per_hour, s.days, s.seed)
    }

    /// Dispatch limits derived from `[dispatch]`.
    pub fn dispatch_config(&self) -> DispatchConfig {
        let d = &self.dispatch;
        DispatchConfig {
            dt_hours: 1.0 / self.simulation.steps_per_hour.max(1) as f64,
            soc_min: d.soc_min,
            soc_max: d.soc_max,
            restriction: d.restriction,
            current_charge_max: d.current_charge_max,
            current_discharge_max: d.current_discharge_max,
            power_charge_max: d.power_charge_max,
            power_discharge_max: d.power_discharge_max,
            min_dwell_minutes: d.min_dwell_minutes,
            max_iterations: d.max_iterations,
            meter: d.meter,
        }
    }

    /// Battery model from `[battery]`.
    pub fn build_battery(&self) -> SimpleBattery {
        let b = &self.battery;
        SimpleBattery::new(
            b.capacity_ah,
            b.nominal_voltage,
            b.initial_soc,
            1.0 / self.simulation.steps_per_hour.max(1) as f64,
        )
        .with_charge_efficiency(b.charge_efficiency)
        .with_voltage_swing(b.voltage_swing)
        .with_cycle_damage_pct(b.cycle_damage_pct)
    }

    /// PV, clipped PV and load series, read from `[profiles].csv` when set
    /// and generated from `[solar]` and `[load]` otherwise.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the profile CSV cannot be read.
    pub fn site_series(&self) -> Result<SiteSeries, ConfigError> {
        if let Some(path) = &self.profiles.csv {
            return profile::load_site(path)
                .map_err(|e| ConfigError::new("profiles.csv", format!("{}: {e}", path.display())));
        }

        let sim = self.sim_config();
        let total = sim.total_steps();
        let sol = &self.solar;
        let (pv_kw, clipped_kw) = SolarPv::new(
            sol.kw_dc_peak,
            sol.inverter_ac_kw,
            sol.sunrise_hour,
            sol.sunset_hour,
            sol.noise_std,
            sim.steps_per_hour,
            sim.seed,
        )
        .series(total);
        let l = &self.load;
        let load_kw = BaseLoad::new(
            l.base_kw,
            l.amp_kw,
            l.phase_rad,
            l.noise_std,
            sim.steps_per_hour,
            sim.seed.wrapping_add(1),
        )
        .series(total);

        Ok(SiteSeries {
            pv_kw,
            clipped_kw,
            load_kw,
        })
    }

    fn load_series(field: &str, path: &Path) -> Result<Vec<f64>, ConfigError> {
        profile::load_series(path)
            .map_err(|e| ConfigError::new(field, format!("{}: {e}", path.display())))
    }

    /// Builds the configured policy with its forecasts installed.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for invalid schedules or unreadable CSV inputs.
    pub fn build_strategy(&self, site: &SiteSeries) -> Result<DispatchStrategy, ConfigError> {
        let d = &self.dispatch;
        let auto = &d.automatic;
        let sph = self.simulation.steps_per_hour.max(1);

        let mut strategy: DispatchStrategy = match d.strategy {
            StrategyKind::Manual => {
                let m = &d.manual;
                let schedule = week_schedule(
                    "dispatch.manual.schedule",
                    &m.weekday_schedule,
                    &m.weekend_schedule,
                    m.profiles.len(),
                )?;
                ManualPolicy::new(schedule, m.profiles.clone())
                    .map_err(|e| ConfigError::new("dispatch.manual.schedule", e.to_string()))?
                    .into()
            }
            StrategyKind::PeakShaving => {
                let mut policy = PeakShavingPolicy::new(auto.mode, auto.permissions(), sph);
                if let Some(path) = &auto.target_power_csv {
                    policy.set_target_power(Self::load_series(
                        "dispatch.automatic.target_power_csv",
                        path,
                    )?);
                }
                policy.into()
            }
            StrategyKind::Economic => {
                let e = &d.economic;
                let ppa = PriceSchedule::new(
                    week_schedule(
                        "dispatch.economic.ppa_schedule",
                        &e.ppa_weekday_schedule,
                        &e.ppa_weekend_schedule,
                        e.ppa_factors.len(),
                    )?,
                    e.ppa_factors.clone(),
                )
                .map_err(|err| {
                    ConfigError::new("dispatch.economic.ppa_schedule", err.to_string())
                })?;
                let purchase = PriceSchedule::new(
                    week_schedule(
                        "dispatch.economic.purchase_schedule",
                        &e.purchase_weekday_schedule,
                        &e.purchase_weekend_schedule,
                        e.purchase_rates.len(),
                    )?,
                    e.purchase_rates.clone(),
                )
                .map_err(|err| {
                    ConfigError::new("dispatch.economic.purchase_schedule", err.to_string())
                })?;
                EconomicPolicy::new(
                    auto.permissions(),
                    sph,
                    auto.look_ahead_hours,
                    auto.update_hours,
                    e.inverter_ac_kw.unwrap_or(self.solar.inverter_ac_kw),
                    e.ppa_price,
                    &ppa,
                    purchase,
                )
                .with_cycle_cost(e.cycle_cost)
                .with_efficiencies(e.efficiencies)
                .into()
            }
        };

        let steps_per_day = sph * HOURS_PER_DAY;
        let horizon = site.pv_kw.len().max(site.load_kw.len());
        let extra = auto.look_ahead_hours * sph;
        let mode = auto.forecast_mode();
        let forecast = |series: &[f64]| {
            extend_for_look_ahead(&mode.forecast(series, steps_per_day, horizon), extra)
        };
        strategy.set_forecasts(
            forecast(&site.pv_kw),
            forecast(&site.clipped_kw),
            forecast(&site.load_kw),
        );

        if auto.mode == AutomaticMode::Custom {
            if let Some(path) = &auto.custom_dispatch_csv {
                let custom = Self::load_series("dispatch.automatic.custom_dispatch_csv", path)?;
                strategy.set_custom_dispatch(custom);
            }
        }

        Ok(strategy)
    }

    /// Validates the scenario and assembles a ready-to-run engine.
    ///
    /// # Errors
    ///
    /// Returns the first validation error, or any error raised while
    /// loading profiles or building the policy.
    pub fn build_engine(&self) -> Result<Engine<DispatchStrategy, SimpleBattery>, ConfigError> {
        if let Some(err) = self.validate().into_iter().next() {
            return Err(err);
        }
        let site = self.site_series()?;
        let strategy = self.build_strategy(&site)?;
        let flow = BatteryPowerFlow::new(self.dispatch.connection, self.dispatch.efficiency);
        let dispatcher = Dispatcher::with_power_flow(self.dispatch_config(), strategy, flow);
        Ok(Engine::new(self.sim_config(), dispatcher, self.build_battery(), site))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn default_scenario_valid() {
        let errors = ScenarioConfig::default().validate();
        assert!(errors.is_empty(), "default should be valid: {errors:?}");
    }

    #[test]
    fn from_preset_unknown() {
        let err = ScenarioConfig::from_preset("nonexistent");
        assert!(err.is_err());
        let e = err.unwrap_err();
        assert_eq!(e.field, "preset");
        assert!(e.message.contains("unknown preset"));
    }

    #[test]
    fn all_presets_are_valid() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset {name} should load");
            let errors = cfg.map(|c| c.validate()).unwrap_or_default();
            assert!(errors.is_empty(), "preset {name} has errors: {errors:?}");
        }
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[simulation]
steps_per_hour = 4
days = 2
seed = 99

[battery]
capacity_ah = 200.0
nominal_voltage = 48.0
initial_soc = 30.0

[dispatch]
strategy = "economic"
meter = "front_of_meter"
connection = "dc"
restriction = "power"
soc_min = 15.0
soc_max = 90.0

[dispatch.efficiency]
ac_to_dc = 0.96

[dispatch.automatic]
can_clip_charge = true
look_ahead_hours = 12
update_hours = 2.0

[dispatch.economic]
ppa_price = 0.05
ppa_factors = [1.0, 2.0]

[dispatch.economic.cycle_cost]
model = "modeled"
replacement_cost_per_kwh = 300.0

[load]
base_kw = 1.0
"#;
        let cfg = ScenarioConfig::from_toml_str(toml);
        assert!(cfg.is_ok(), "valid TOML should parse: {:?}", cfg.err());
        let cfg = cfg.unwrap();
        assert_eq!(cfg.simulation.steps_per_hour, 4);
        assert_eq!(cfg.dispatch.strategy, StrategyKind::Economic);
        assert_eq!(cfg.dispatch.connection, ConnectionMode::Dc);
        assert_eq!(cfg.dispatch.efficiency.ac_to_dc, 0.96);
        assert_eq!(cfg.dispatch.efficiency.dc_to_ac, 1.0);
        assert_eq!(
            cfg.dispatch.economic.cycle_cost,
            CycleCost::Modeled {
                replacement_cost_per_kwh: 300.0
            }
        );
        assert_eq!(cfg.dispatch_config().dt_hours, 0.25);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn manual_profiles_from_toml() {
        let toml = r#"
[[dispatch.manual.profiles]]
can_charge = true

[[dispatch.manual.profiles]]
can_charge = false
can_discharge = true
discharge_percent = 40.0
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.dispatch.manual.profiles.len(), 2);
        assert_eq!(cfg.dispatch.manual.profiles[1].discharge_percent, 40.0);
        assert_eq!(cfg.dispatch.manual.profiles[1].grid_charge_percent, 100.0);
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[dispatch]
soc_min = 10.0
bogus_field = true
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validation_catches_soc_order() {
        let mut cfg = ScenarioConfig::default();
        cfg.dispatch.soc_min = 90.0;
        cfg.dispatch.soc_max = 20.0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "dispatch.soc_min"));
    }

    #[test]
    fn validation_catches_zero_iterations() {
        let mut cfg = ScenarioConfig::default();
        cfg.dispatch.max_iterations = 0;
        assert!(cfg.validate().iter().any(|e| e.field == "dispatch.max_iterations"));
    }

    #[test]
    fn economic_requires_front_of_meter() {
        let mut cfg = ScenarioConfig::merchant_pv();
        cfg.dispatch.meter = MeterPosition::BehindTheMeter;
        assert!(cfg.validate().iter().any(|e| e.field == "dispatch.meter"));
    }

    #[test]
    fn peak_shaving_requires_behind_the_meter() {
        let mut cfg = ScenarioConfig::peak_shaving();
        cfg.dispatch.meter = MeterPosition::FrontOfMeter;
        assert!(cfg.validate().iter().any(|e| e.field == "dispatch.meter"));
    }

    #[test]
    fn custom_mode_requires_csv() {
        let mut cfg = ScenarioConfig::peak_shaving();
        cfg.dispatch.automatic.mode = AutomaticMode::Custom;
        assert!(
            cfg.validate()
                .iter()
                .any(|e| e.field == "dispatch.automatic.custom_dispatch_csv")
        );
    }

    #[test]
    fn schedule_naming_missing_profile() {
        let mut cfg = ScenarioConfig::manual_tou();
        cfg.dispatch.manual.profiles.truncate(1);
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "dispatch.manual.schedule"));
    }

    #[test]
    fn schedule_with_wrong_shape() {
        let mut cfg = ScenarioConfig::default();
        cfg.dispatch.manual.weekday_schedule = vec![vec![1; 24]; 11];
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.message.contains("12 monthly rows")));
    }

    #[test]
    fn manual_preset_windows() {
        let cfg = ScenarioConfig::manual_tou();
        let rows = &cfg.dispatch.manual.weekday_schedule;
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0][16], 1);
        assert_eq!(rows[0][17], 2);
        assert_eq!(rows[0][20], 2);
        assert_eq!(rows[0][21], 1);
    }

    #[test]
    fn merchant_uses_inverter_default() {
        let cfg = ScenarioConfig::merchant_pv();
        assert!(cfg.dispatch.economic.inverter_ac_kw.is_none());
        assert!(cfg.solar.kw_dc_peak > cfg.solar.inverter_ac_kw);
    }

    #[test]
    fn synthetic_site_has_one_value_per_step() {
        let mut cfg = ScenarioConfig::default();
        cfg.simulation.steps_per_hour = 2;
        cfg.simulation.days = 3;
        let site = cfg.site_series().unwrap();
        assert_eq!(site.pv_kw.len(), 144);
        assert_eq!(site.clipped_kw.len(), 144);
        assert_eq!(site.load_kw.len(), 144);
    }

    #[test]
    fn build_engine_rejects_invalid() {
        let mut cfg = ScenarioConfig::default();
        cfg.simulation.days = 0;
        let err = cfg.build_engine().err();
        assert_eq!(err.map(|e| e.field), Some("simulation.days".to_string()));
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg = ScenarioConfig::from_toml_str("[simulation]\ndays = 3\n").unwrap();
        assert_eq!(cfg.simulation.days, 3);
        assert_eq!(cfg.simulation.steps_per_hour, 1);
        assert_eq!(cfg.dispatch.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_abs_diff_eq!(cfg.battery.capacity_kwh(), 10.0, epsilon = 1e-9);
    }
}
