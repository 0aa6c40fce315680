//! Runs the extraction and both discharge simulators over a directory of cell logs.
//!
//! Usage: `cellsim <cell_log_dir> <wltc_csv> [run_config.json]`

use std::error::Error;
use std::path::{Path, PathBuf};

use electrical::{CellModel, range_vs_soh, simulate_0th_order, simulate_1st_order, soh_by_cell};
use log::LevelFilter;
use mechanics::{DriveCycleTrace, VehicleConstants, VehicleParams, simulate_drive_cycle};
use serde::{Deserialize, Serialize};
use simcore::{CellLog, ExtractionConfig, PackConfig};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RunConfig {
    extraction: ExtractionConfig,
    pack: PackConfig,
    vehicle: VehicleParams,
    vehicle_constants: VehicleConstants,
    /// Cell treated as brand new for SoH; the first log by name when unset
    baseline_cell: Option<String>,
}

fn load_run_config(path: Option<&String>) -> Result<RunConfig, Box<dyn Error>> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(RunConfig::default()),
    }
}

fn load_cell_logs(dir: &Path) -> Result<Vec<CellLog>, Box<dyn Error>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
        .collect();
    paths.sort();

    let mut logs = Vec::with_capacity(paths.len());
    for path in paths {
        let log = CellLog::from_csv_path(&path)?;
        log::info!("loaded {} ({} samples)", path.display(), log.len());
        logs.push(log);
    }
    Ok(logs)
}

fn main() -> Result<(), Box<dyn Error>> {
    TermLogger::init(LevelFilter::Info, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: {} <cell_log_dir> <wltc_csv> [run_config.json]", args[0]);
        std::process::exit(2);
    }
    let config = load_run_config(args.get(3))?;
    config.pack.validate()?;

    let logs = load_cell_logs(Path::new(&args[1]))?;
    if logs.is_empty() {
        return Err(format!("no .csv cell logs in {}", args[1]).into());
    }
    let trace = DriveCycleTrace::from_csv_path(&args[2])?;
    let demand = simulate_drive_cycle(&trace, &config.vehicle_constants, &config.vehicle);
    log::info!(
        "drive cycle: {} s, {:.1} Wh per pass, peak wheel power {:.1} kW, peak battery power {:.1} kW",
        demand.len(),
        demand.total_energy_wh(),
        demand.peak_wheel_power_w() / 1000.0,
        demand.peak_battery_power_w() / 1000.0
    );

    let mut models = Vec::with_capacity(logs.len());
    for log in &logs {
        match CellModel::from_log(log, &config.extraction) {
            Ok(model) => {
                let (soc_min, soc_max) = model.ocv.domain();
                log::info!(
                    "{}: {:.3} Ah, OCV curve over SoC {:.1}..{:.1} %",
                    model.cell_id,
                    model.capacity_ah,
                    soc_min,
                    soc_max
                );
                models.push(model);
            }
            Err(err) => log::error!("{}: extraction failed: {}", log.id(), err),
        }
    }

    for model in &models {
        let zeroth = simulate_0th_order(model, &demand, &config.pack)?;
        log::info!(
            "{} 0th order: {:?}, range {:.1} km",
            model.cell_id,
            zeroth.summary(),
            zeroth.range_m() / 1000.0
        );
        match simulate_1st_order(model, &demand, &config.pack) {
            Ok(first) => log::info!("{} 1st order: {:?}", model.cell_id, first.summary()),
            Err(err) => log::warn!("{} 1st order skipped: {}", model.cell_id, err),
        }
    }

    let baseline = config
        .baseline_cell
        .clone()
        .unwrap_or_else(|| logs[0].id().to_string());
    for (cell, soh) in soh_by_cell(&logs, &baseline, &config.extraction)? {
        log::info!("{cell}: SoH {soh:.2} %");
    }
    // range_vs_soh only sees cells whose extraction succeeded
    if models.iter().any(|model| model.cell_id == baseline) {
        range_vs_soh(&models, &baseline, &demand, &config.pack)?;
    } else {
        log::warn!("baseline {baseline} has no cell model, range vs SoH skipped");
    }
    Ok(())
}
