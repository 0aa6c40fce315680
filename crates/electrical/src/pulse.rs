//! Pulse event extraction
//!
//! Detects current-step transitions in a cell log and turns them into
//! equivalent-circuit measurements:
//! - Ohmic pulses: the instantaneous voltage jump across a step edge gives R0,
//!   and the sample just before the edge gives the open-circuit voltage
//! - Relaxation pulses: the voltage plateau after a step edge gives the time
//!   constant (63.2 % rise) and, through a fixed-tau exponential fit, the
//!   polarization resistance

use serde::{Deserialize, Serialize};
use simcore::{CellLog, ExtractionConfig, Sample};

use crate::fit::{ExponentialFit, fit_fixed_tau_exponential};

/// A contiguous run of samples sharing a step code of interest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    /// 0-based position among the detected edges, in log order
    pub pulse_index: usize,
    /// First sample of the run (index into the log)
    pub start_index: usize,
    /// Last sample of the run (inclusive)
    pub end_index: usize,
    pub step_code: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhmicPulse {
    pub pulse: Pulse,
    pub start_time: f64,
    /// Pre-edge voltage minus first pulse voltage (V)
    pub delta_voltage: f64,
    /// Pre-edge current minus first pulse current (A)
    pub delta_current: f64,
    /// Ohmic resistance (Ω)
    pub r0: f64,
    /// Open-circuit voltage just before the edge (V)
    pub ocv: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelaxationPulse {
    pub pulse: Pulse,
    /// 1-based position among the accepted plateaus; joins against SoC pulse indices
    pub pulse_id: usize,
    pub step_start_time: f64,
    /// Current on the plateau (A)
    pub step_current: f64,
    /// Time constant (s)
    pub tau: f64,
    /// Polarization resistance (Ω), `NaN` when the fit failed
    pub r_pol: f64,
    /// Polarization capacitance (F), `NaN` unless `r_pol > 0`
    pub c_pol: f64,
    pub fit: Option<ExponentialFit>,
}

fn run_end(samples: &[Sample], start: usize, code: i32) -> usize {
    let mut end = start;
    while end + 1 < samples.len() && samples[end + 1].is_step(code) {
        end += 1;
    }
    end
}

/// Ohmic pulses at every rising edge of `step_code`.
///
/// Pulses whose current step does not exceed the configured noise floor are
/// dropped. On real test data this never happens; it only protects against
/// dividing by a near-zero current step.
pub fn find_ohmic_pulses(log: &CellLog, step_code: i32, config: &ExtractionConfig) -> Vec<OhmicPulse> {
    let samples = log.samples();
    let mut pulses = Vec::new();

    for (pulse_index, idx) in log.rising_edges(step_code).into_iter().enumerate() {
        let pre = &samples[idx - 1];
        let first = &samples[idx];

        let delta_voltage = pre.voltage - first.voltage;
        let delta_current = pre.current - first.current;
        let r0 = delta_voltage / delta_current;
        // pre-edge current is not always exactly zero
        let ocv = pre.voltage + pre.current * r0;

        if !(delta_current.abs() > config.current_noise_floor_a) {
            log::debug!(
                "{}: step {} pulse {} at t={} dropped, current step {:.3} A",
                log.id(),
                step_code,
                pulse_index,
                first.total_time,
                delta_current
            );
            continue;
        }

        pulses.push(OhmicPulse {
            pulse: Pulse {
                pulse_index,
                start_index: idx,
                end_index: run_end(samples, idx, step_code),
                step_code,
            },
            start_time: first.total_time,
            delta_voltage,
            delta_current,
            r0,
            ocv,
        });
    }
    pulses
}

/// Piecewise-linear lookup of `x` in `xp` (ascending), clamped at both ends.
pub(crate) fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len();
    if x.is_nan() || n == 0 {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    let j = xp.partition_point(|&v| v <= x).saturating_sub(1).min(n - 2);
    let dx = xp[j + 1] - xp[j];
    if dx == 0.0 {
        return fp[j];
    }
    fp[j] + (fp[j + 1] - fp[j]) * (x - xp[j]) / dx
}

/// Time (relative to the first sample) at which the plateau covers `fraction`
/// of its first-to-last voltage excursion.
pub fn relaxation_time_constant(times: &[f64], voltages: &[f64], fraction: f64) -> f64 {
    let (Some(&v_first), Some(&v_last)) = (voltages.first(), voltages.last()) else {
        return f64::NAN;
    };
    let v_min = voltages.iter().copied().fold(f64::INFINITY, f64::min);
    let v_max = voltages.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(v_min <= v_max) {
        return f64::NAN;
    }
    let target = (v_first + fraction * (v_last - v_first)).clamp(v_min, v_max);

    let t_target = if v_last >= v_first {
        interp(target, voltages, times)
    } else {
        let negated: Vec<f64> = voltages.iter().map(|v| -v).collect();
        interp(-target, &negated, times)
    };
    t_target - times[0]
}

/// Relaxation plateaus of the configured step inside the configured time window.
///
/// The plateau is the run following the edge sample. Runs shorter than three
/// samples, with negligible current or with negligible voltage excursion are
/// skipped. A failed exponential fit leaves `r_pol` as `NaN` and is logged;
/// it never stops the extraction.
pub fn find_relaxation_pulses(log: &CellLog, config: &ExtractionConfig) -> Vec<RelaxationPulse> {
    let code = config.relaxation_step;
    let [t_min, t_max] = config.relaxation_window_s;
    let samples = log.samples();
    let indices = log.window_indices(t_min, t_max);
    let window: Vec<&Sample> = indices.iter().map(|&i| &samples[i]).collect();

    let mut pulses = Vec::new();
    let mut edge_count = 0;

    for k in 1..window.len() {
        if !(window[k].is_step(code) && !window[k - 1].is_step(code)) {
            continue;
        }
        let pulse_index = edge_count;
        edge_count += 1;

        let mut end = k;
        while end + 1 < window.len() && window[end + 1].is_step(code) {
            end += 1;
        }
        if end <= k + 1 {
            log::debug!("{}: plateau at t={} too short", log.id(), window[k].total_time);
            continue;
        }

        let times: Vec<f64> = (k + 1..=end).map(|j| window[j].total_time).collect();
        let voltages: Vec<f64> = (k + 1..=end).map(|j| window[j].voltage).collect();
        let step_current = window[k + 1].current;

        if step_current.abs() < config.min_relaxation_current_a || voltages.len() < 3 {
            log::debug!("{}: plateau at t={} skipped, current {:.4} A", log.id(), window[k].total_time, step_current);
            continue;
        }
        let excursion = voltages[voltages.len() - 1] - voltages[0];
        if excursion.abs() < config.min_voltage_excursion_v {
            log::debug!("{}: plateau at t={} skipped, excursion {:.5} V", log.id(), window[k].total_time, excursion);
            continue;
        }

        let tau = relaxation_time_constant(&times, &voltages, config.tau_fraction);
        let t_fit: Vec<f64> = times.iter().map(|t| t - times[0]).collect();
        let initial_guess = (voltages[0], excursion);

        let (fit, r_pol) =
            match fit_fixed_tau_exponential(&t_fit, &voltages, tau, initial_guess, config.fit_max_evaluations) {
                Ok(fit) => (Some(fit), fit.amplitude / step_current),
                Err(err) => {
                    log::warn!("{}: step {} fit failed at t={}: {}", log.id(), code, window[k].total_time, err);
                    (None, f64::NAN)
                }
            };
        let c_pol = if r_pol > 0.0 { tau / r_pol } else { f64::NAN };

        pulses.push(RelaxationPulse {
            pulse: Pulse {
                pulse_index,
                start_index: indices[k],
                end_index: indices[end],
                step_code: code,
            },
            pulse_id: pulses.len() + 1,
            step_start_time: window[k].total_time,
            step_current,
            tau,
            r_pol,
            c_pol,
            fit,
        });
    }
    pulses
}
