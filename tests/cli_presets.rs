//! Runs the binary on each preset and checks the printed KPI report.

use std::process::Command;

#[derive(Debug)]
struct Kpis {
    peak_import_kw: f64,
    peak_import_without_battery_kw: f64,
    throughput_kwh: f64,
}

#[test]
fn presets_run_via_cli_and_move_the_battery() {
    let manual = run_and_parse_kpis(&["--preset", "manual_tou", "--days", "3"]);
    let peak = run_and_parse_kpis(&["--preset", "peak_shaving", "--days", "3"]);
    let merchant = run_and_parse_kpis(&["--preset", "merchant_pv", "--days", "3"]);

    assert!(
        peak.peak_import_kw < peak.peak_import_without_battery_kw,
        "peak shaving did not lower the peak: {peak:?}"
    );
    for kpis in [&manual, &peak, &merchant] {
        assert!(kpis.throughput_kwh > 0.0, "battery never moved: {kpis:?}");
    }
}

#[test]
fn unknown_preset_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_battery-dispatch"))
        .args(["--preset", "no_such_preset"])
        .output()
        .expect("battery-dispatch process should run");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("preset"), "stderr: {stderr}");
}

#[test]
fn scenario_file_with_invalid_fields_fails() {
    let path =
        std::env::temp_dir().join(format!("battery-dispatch-cli-{}.toml", std::process::id()));
    std::fs::write(&path, "[dispatch]\nsoc_min = 90.0\nsoc_max = 20.0\n")
        .expect("temp file writable");

    let output = Command::new(env!("CARGO_BIN_EXE_battery-dispatch"))
        .arg("--scenario")
        .arg(&path)
        .output()
        .expect("battery-dispatch process should run");
    std::fs::remove_file(&path).ok();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("dispatch.soc_min"), "stderr: {stderr}");
}

fn run_and_parse_kpis(args: &[&str]) -> Kpis {
    let output = Command::new(env!("CARGO_BIN_EXE_battery-dispatch"))
        .args(args)
        .output()
        .expect("battery-dispatch process should run");

    assert!(
        output.status.success(),
        "run failed for {args:?}: stderr={} ",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout should be valid UTF-8");
    parse_kpis(&stdout)
}

fn parse_kpis(stdout: &str) -> Kpis {
    let import = metric_line(stdout, "Peak import:");
    let (with_battery, without) = import
        .split_once("(without battery")
        .unwrap_or_else(|| panic!("invalid peak import line `{import}`"));

    Kpis {
        peak_import_kw: parse_number(with_battery, "kW"),
        peak_import_without_battery_kw: parse_number(without.trim_end_matches(')'), "kW"),
        throughput_kwh: parse_number(
            metric_line(stdout, "Battery throughput:")
                .split_once('(')
                .map_or("", |(left, _)| left),
            "kWh",
        ),
    }
}

fn metric_line<'a>(stdout: &'a str, label: &str) -> &'a str {
    let line = stdout
        .lines()
        .find(|line| line.trim_start().starts_with(label))
        .unwrap_or_else(|| panic!("missing KPI line `{label}` in output: {stdout}"));
    line.split_once(':')
        .map(|(_, right)| right.trim())
        .unwrap_or_else(|| panic!("invalid KPI format for line `{line}`"))
}

fn parse_number(raw: &str, unit: &str) -> f64 {
    let raw = raw.trim();
    let numeric = raw.strip_suffix(unit).unwrap_or(raw).trim();
    numeric
        .parse::<f64>()
        .unwrap_or_else(|_| panic!("failed parsing `{numeric}` as {unit}"))
}
