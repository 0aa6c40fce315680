//! Explicit configuration for parameter extraction, pack layout and simulation.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Step codes and thresholds used when reading pulses out of a cell log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Step holding the discharge current pulse (ohmic R0 / OCV)
    pub discharge_pulse_step: i32,
    /// Step holding the charge current pulse (charge R0)
    pub charge_pulse_step: i32,
    /// Step whose plateau is fitted for the polarization branch
    pub relaxation_step: i32,
    /// Constant-current block used for coulomb counting between pulses
    pub coulomb_step: i32,
    /// Full constant-current discharge used for the total capacity
    pub capacity_step: i32,
    /// Pulses whose current step is not larger than this (A) are discarded
    pub current_noise_floor_a: f64,
    /// Relaxation plateaus below this current (A) are skipped
    pub min_relaxation_current_a: f64,
    /// Only samples with `total_time` inside this window (s) are used for relaxation fits
    pub relaxation_window_s: [f64; 2],
    /// Plateaus with a smaller voltage excursion (V) are skipped
    pub min_voltage_excursion_v: f64,
    /// Fraction of the voltage excursion that defines tau
    pub tau_fraction: f64,
    /// Evaluation budget for the exponential least-squares fit
    pub fit_max_evaluations: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            discharge_pulse_step: 7,
            charge_pulse_step: 9,
            relaxation_step: 9,
            coulomb_step: 15,
            capacity_step: 27,
            current_noise_floor_a: 10.0,
            min_relaxation_current_a: 0.01,
            relaxation_window_s: [16_000.0, 25_000.0],
            min_voltage_excursion_v: 1e-3,
            tau_fraction: 0.632,
            fit_max_evaluations: 5000,
        }
    }
}

impl ExtractionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time window used for relaxation fits
    pub fn with_relaxation_window(mut self, t_min: f64, t_max: f64) -> Self {
        self.relaxation_window_s = [t_min, t_max];
        self
    }

    /// Set the minimum current step for an ohmic pulse to count
    pub fn with_noise_floor(mut self, current_a: f64) -> Self {
        self.current_noise_floor_a = current_a;
        self
    }

    /// Pulse step code for the requested direction
    pub fn ohmic_step(&self, charge: bool) -> i32 {
        if charge {
            self.charge_pulse_step
        } else {
            self.discharge_pulse_step
        }
    }
}

/// Series/parallel layout of the pack and the what-if multipliers applied to
/// the extracted cell parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    pub series_count: f64,
    pub parallel_count: f64,
    pub r0_multiplier: f64,
    pub r1_multiplier: f64,
    pub ocv_multiplier: f64,
    /// Starting state of charge (%)
    pub initial_soc_percent: f64,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            series_count: 110.0,
            parallel_count: 2.0,
            r0_multiplier: 1.0,
            r1_multiplier: 1.0,
            ocv_multiplier: 1.0,
            initial_soc_percent: 100.0,
        }
    }
}

impl PackConfig {
    pub fn new(series_count: f64, parallel_count: f64) -> Self {
        Self {
            series_count,
            parallel_count,
            ..Default::default()
        }
    }

    pub fn with_r0_multiplier(mut self, multiplier: f64) -> Self {
        self.r0_multiplier = multiplier;
        self
    }

    pub fn with_r1_multiplier(mut self, multiplier: f64) -> Self {
        self.r1_multiplier = multiplier;
        self
    }

    pub fn with_ocv_multiplier(mut self, multiplier: f64) -> Self {
        self.ocv_multiplier = multiplier;
        self
    }

    pub fn with_initial_soc(mut self, soc_percent: f64) -> Self {
        self.initial_soc_percent = soc_percent;
        self
    }

    /// Pack OCV from a single-cell OCV
    pub fn pack_ocv(&self, cell_ocv: f64) -> f64 {
        cell_ocv * self.series_count * self.ocv_multiplier
    }

    /// Pack ohmic resistance from a single-cell R0
    pub fn pack_r0(&self, cell_r0: f64) -> f64 {
        cell_r0 * self.series_count * self.r0_multiplier / self.parallel_count
    }

    /// Pack polarization resistance from a single-cell R1
    pub fn pack_r1(&self, cell_r1: f64) -> f64 {
        cell_r1 * self.series_count * self.r1_multiplier / self.parallel_count
    }

    /// Pack capacity (Ah) from a single-cell capacity; series strings do not add capacity
    pub fn pack_capacity_ah(&self, cell_capacity_ah: f64) -> f64 {
        self.parallel_count * cell_capacity_ah
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("series_count", self.series_count),
            ("parallel_count", self.parallel_count),
            ("r0_multiplier", self.r0_multiplier),
            ("r1_multiplier", self.r1_multiplier),
            ("ocv_multiplier", self.ocv_multiplier),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ModelError::InvalidConfig(format!("{name} must be positive, got {value}")));
            }
        }
        if !self.initial_soc_percent.is_finite() {
            return Err(ModelError::InvalidConfig("initial_soc_percent must be finite".to_string()));
        }
        Ok(())
    }
}

/// Stop conditions for the discharge simulators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// The run stops once SoC is no longer above this value (%)
    pub soc_cutoff_percent: f64,
    /// Upper bound on simulated time (s) for runs that never deplete
    pub max_duration_s: usize,
}

const TEN_DAYS_S: usize = 10 * 24 * 3600;

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::zeroth_order()
    }
}

impl SimulationConfig {
    /// Cutoff used by the OCV + R0 simulator
    pub fn zeroth_order() -> Self {
        Self {
            soc_cutoff_percent: 0.1,
            max_duration_s: TEN_DAYS_S,
        }
    }

    /// Cutoff used by the OCV + R0 + RC simulator
    pub fn first_order() -> Self {
        Self {
            soc_cutoff_percent: 5.0,
            max_duration_s: TEN_DAYS_S,
        }
    }

    pub fn with_cutoff(mut self, soc_percent: f64) -> Self {
        self.soc_cutoff_percent = soc_percent;
        self
    }

    pub fn with_max_duration(mut self, seconds: usize) -> Self {
        self.max_duration_s = seconds;
        self
    }
}
