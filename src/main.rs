//! Battery dispatch simulator entry point: CLI wiring and config-driven runs.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use battery_dispatch::config::ScenarioConfig;
use battery_dispatch::io::export::export_csv;
use battery_dispatch::sim::kpi::KpiReport;

/// Simulates a PV + storage site under a battery dispatch policy.
#[derive(Debug, Parser)]
#[command(name = "battery-dispatch", version, about)]
#[command(
    after_help = "If neither --scenario nor --preset is given, the manual_tou preset is used.\n\
    Log verbosity follows RUST_LOG (default: battery_dispatch=info)."
)]
struct Cli {
    /// Load the scenario from a TOML file
    #[arg(long, value_name = "PATH", conflicts_with = "preset")]
    scenario: Option<PathBuf>,

    /// Use a built-in preset (manual_tou, peak_shaving, merchant_pv)
    #[arg(long, value_name = "NAME")]
    preset: Option<String>,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the number of simulated days
    #[arg(long)]
    days: Option<usize>,

    /// Export every step to CSV
    #[arg(long, value_name = "PATH")]
    telemetry_out: Option<PathBuf>,

    /// Print one line per step
    #[arg(long)]
    print_steps: bool,

    /// Serve the finished run over HTTP
    #[cfg(feature = "api")]
    #[arg(long)]
    serve: bool,

    /// API server port
    #[cfg(feature = "api")]
    #[arg(long, default_value_t = 3000)]
    port: u16,
}

fn load_scenario(cli: &Cli) -> anyhow::Result<ScenarioConfig> {
    let mut scenario = match (&cli.scenario, &cli.preset) {
        (Some(path), _) => ScenarioConfig::from_toml_file(path)?,
        (None, Some(name)) => ScenarioConfig::from_preset(name)?,
        (None, None) => ScenarioConfig::manual_tou(),
    };
    if let Some(seed) = cli.seed {
        scenario.simulation.seed = seed;
    }
    if let Some(days) = cli.days {
        scenario.simulation.days = days;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        bail!("scenario has {} invalid field(s)", errors.len());
    }
    Ok(scenario)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("battery_dispatch=info")),
        )
        .init();

    let cli = Cli::parse();
    let scenario = load_scenario(&cli)?;

    let mut engine = scenario.build_engine()?;
    let results = engine.run();
    let dispatch = engine.dispatcher().config().clone();
    let kpi = KpiReport::from_results(
        &results,
        dispatch.dt_hours,
        scenario.battery.capacity_kwh(),
        dispatch.max_iterations,
    );

    if cli.print_steps {
        for r in &results {
            println!("{r}");
        }
    }
    println!("\n{kpi}");

    let metrics = engine.metrics();
    println!(
        "Efficiency:            {:.1}% average, {:.1}% round trip, {:.1}% charged from PV",
        metrics.average_efficiency_pct(),
        metrics.round_trip_efficiency_pct(),
        metrics.pv_charge_pct()
    );

    if let Some(path) = &cli.telemetry_out {
        export_csv(&results, path)
            .with_context(|| format!("failed to write CSV to {}", path.display()))?;
        info!(path = %path.display(), rows = results.len(), "telemetry written");
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        use battery_dispatch::dispatch::DispatchPolicy;

        let state = Arc::new(battery_dispatch::api::AppState {
            config: engine.config().clone(),
            policy: engine.dispatcher().policy().name().to_string(),
            dispatch,
            kpi,
            metrics: metrics.clone(),
            results,
        });
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
        rt.block_on(battery_dispatch::api::serve(state, addr))
            .with_context(|| format!("API server on {addr} failed"))?;
    }

    Ok(())
}
