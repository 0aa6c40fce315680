//! Drive-cycle power demand
//!
//! Converts the reference WLTC speed trace into a second-by-second power
//! demand at the wheels, at the motor shaft and at the battery terminals.
//! The result is a pure function of the trace, the vehicle constants and the
//! per-run vehicle parameters.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use simcore::{ModelError, Result};

use crate::vehicle::{VehicleConstants, VehicleParams};

pub const WLTC_TIME_COLUMN: &str = "Total elapsed time";
pub const WLTC_SPEED_COLUMN: &str = "WLTC class 3, version 5, vehicle speed";
/// Samples in the WLTC class 3 trace (0..=1800 s)
pub const WLTC_CLASS3_SAMPLES: usize = 1801;

const KMH_PER_MS: f64 = 3.6;

/// Reference speed profile sampled once per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveCycleTrace {
    time_s: Vec<f64>,
    speed_ms: Vec<f64>,
}

impl DriveCycleTrace {
    /// Build a trace from speeds in m/s at 1 s spacing.
    pub fn from_speeds_ms(speed_ms: Vec<f64>) -> Result<Self> {
        let time_s = (0..speed_ms.len()).map(|t| t as f64).collect();
        Self::new(time_s, speed_ms)
    }

    /// Build a trace from speeds in km/h at 1 s spacing.
    pub fn from_speeds_kmh(speed_kmh: Vec<f64>) -> Result<Self> {
        Self::from_speeds_ms(speed_kmh.into_iter().map(|v| v / KMH_PER_MS).collect())
    }

    fn new(time_s: Vec<f64>, speed_ms: Vec<f64>) -> Result<Self> {
        if speed_ms.is_empty() {
            return Err(ModelError::InvalidConfig("drive cycle trace is empty".to_string()));
        }
        if speed_ms.len() != WLTC_CLASS3_SAMPLES {
            log::warn!(
                "drive cycle has {} samples, the WLTC class 3 reference has {}",
                speed_ms.len(),
                WLTC_CLASS3_SAMPLES
            );
        }
        Ok(DriveCycleTrace { time_s, speed_ms })
    }

    /// Load the reference trace (speed column in km/h).
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        Self::from_reader(&path.display().to_string(), file)
    }

    pub fn from_reader<R: Read>(source_name: &str, reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let column = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| ModelError::MissingColumn {
                    source_name: source_name.to_string(),
                    column: name.to_string(),
                    found: headers.clone(),
                })
        };
        let time_idx = column(WLTC_TIME_COLUMN)?;
        let speed_idx = column(WLTC_SPEED_COLUMN)?;

        let mut time_s = Vec::new();
        let mut speed_ms = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let numeric = |idx: usize| {
                record
                    .get(idx)
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(f64::NAN)
            };
            time_s.push(numeric(time_idx));
            speed_ms.push(numeric(speed_idx) / KMH_PER_MS);
        }
        Self::new(time_s, speed_ms)
    }

    pub fn len(&self) -> usize {
        self.speed_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speed_ms.is_empty()
    }

    pub fn time_s(&self) -> &[f64] {
        &self.time_s
    }

    pub fn speed_ms(&self) -> &[f64] {
        &self.speed_ms
    }

    /// Speed at second `t`, repeating the cycle once it is exhausted
    pub fn speed_at(&self, t: usize) -> f64 {
        self.speed_ms[t % self.speed_ms.len()]
    }
}

/// Per-second power demand over one pass of the trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveCycleResult {
    pub time_s: Vec<f64>,
    pub speed_ms: Vec<f64>,
    /// Wheel power from inertia and rolling resistance only (W)
    pub power_acc_roll_w: Vec<f64>,
    /// Wheel power from inertia, drag and rolling resistance (W)
    pub power_acc_aero_roll_w: Vec<f64>,
    /// Total wheel power including slope (W)
    pub power_total_w: Vec<f64>,
    /// Motor shaft power (W)
    pub power_mech_w: Vec<f64>,
    /// Battery terminal power (W), negative while regenerating
    pub power_batt_w: Vec<f64>,
    /// Cumulative battery energy (Wh)
    pub energy_wh: Vec<f64>,
}

impl DriveCycleResult {
    pub fn len(&self) -> usize {
        self.power_batt_w.len()
    }

    pub fn is_empty(&self) -> bool {
        self.power_batt_w.is_empty()
    }

    /// Battery energy for one full cycle (Wh)
    pub fn total_energy_wh(&self) -> f64 {
        self.energy_wh.last().copied().unwrap_or(0.0)
    }

    /// Battery demand at second `t`, repeating the cycle once it is exhausted
    pub fn battery_power_at(&self, t: usize) -> f64 {
        self.power_batt_w[t % self.power_batt_w.len()]
    }

    /// Vehicle speed at second `t`, repeating the cycle once it is exhausted
    pub fn speed_at(&self, t: usize) -> f64 {
        self.speed_ms[t % self.speed_ms.len()]
    }

    pub fn peak_wheel_power_w(&self) -> f64 {
        self.power_total_w.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn peak_battery_power_w(&self) -> f64 {
        self.power_batt_w.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Run the vehicle over one pass of `trace`.
///
/// Second 0 carries only the auxiliary load; every later second uses the
/// backward difference of the speed trace as acceleration (dt = 1 s).
pub fn simulate_drive_cycle(
    trace: &DriveCycleTrace,
    constants: &VehicleConstants,
    params: &VehicleParams,
) -> DriveCycleResult {
    let n = trace.len();
    let speeds = trace.speed_ms();
    let mut result = DriveCycleResult {
        time_s: trace.time_s().to_vec(),
        speed_ms: speeds.to_vec(),
        power_acc_roll_w: Vec::with_capacity(n),
        power_acc_aero_roll_w: Vec::with_capacity(n),
        power_total_w: Vec::with_capacity(n),
        power_mech_w: Vec::with_capacity(n),
        power_batt_w: Vec::with_capacity(n),
        energy_wh: Vec::with_capacity(n),
    };

    let mut energy_wh = 0.0;
    for t in 0..n {
        if t == 0 {
            result.power_acc_roll_w.push(0.0);
            result.power_acc_aero_roll_w.push(0.0);
            result.power_total_w.push(0.0);
            result.power_mech_w.push(0.0);
            result.power_batt_w.push(constants.aux_power_w);
            result.energy_wh.push(energy_wh);
            continue;
        }

        let v = speeds[t];
        let accel = speeds[t] - speeds[t - 1];
        let load = constants.road_load(params, v, accel);

        let wheel_power = load.total() * v;
        let battery_power = constants.battery_power(wheel_power);
        energy_wh += battery_power / 3600.0;

        result.power_acc_roll_w.push((load.acceleration + load.rolling) * v);
        result.power_acc_aero_roll_w.push((load.acceleration + load.aero + load.rolling) * v);
        result.power_total_w.push(wheel_power);
        result.power_mech_w.push(constants.mechanical_power(wheel_power));
        result.power_batt_w.push(battery_power);
        result.energy_wh.push(energy_wh);
    }

    log::debug!(
        "drive cycle: mass {:.0} kg, grade {:.4} rad, headwind {:.2} m/s -> {:.1} Wh",
        params.mass_kg,
        params.grade_rad,
        params.headwind_ms,
        energy_wh
    );
    result
}

/// Drive-cycle demand with the default vehicle constants.
pub fn run_drive_cycle(trace: &DriveCycleTrace, mass_kg: f64, grade_rad: f64, headwind_ms: f64) -> DriveCycleResult {
    simulate_drive_cycle(
        trace,
        &VehicleConstants::default(),
        &VehicleParams::new(mass_kg, grade_rad, headwind_ms),
    )
}
