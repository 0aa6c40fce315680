//! SoC-indexed circuit parameter curves
//!
//! Pulse measurements are joined with the coulomb-counted SoC trajectory and
//! turned into monotone cubic curves. [`CellModel`] does the whole extraction
//! once per log and is then shared read-only by every simulation run.

use serde::{Deserialize, Serialize};
use simcore::{CellLog, ExtractionConfig, ModelError, Result};

use crate::capacity::{SocPoint, coulomb_blocks, overall_capacity, soc_from_blocks, soc_trajectory};
use crate::interpolation::{Extrapolation, ParameterCurve};
use crate::pulse::{OhmicPulse, RelaxationPulse, find_ohmic_pulses, find_relaxation_pulses};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterKind {
    Ocv,
    R0,
    R1,
    Tau,
}

/// An ohmic pulse placed on the SoC axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhmicSample {
    pub pulse_index: usize,
    pub soc_percent: f64,
    pub r0: f64,
    pub ocv: f64,
}

/// A relaxation fit placed on the SoC axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarizationSample {
    pub pulse_id: usize,
    pub soc_percent: f64,
    pub r_pol: f64,
    pub tau: f64,
}

/// Pair the i-th ohmic pulse with the i-th SoC point (point 0 is the 100 % start).
pub fn pair_ohmic_with_soc(cell_id: &str, pulses: &[OhmicPulse], soc: &[SocPoint]) -> Vec<OhmicSample> {
    if pulses.len() != soc.len() {
        log::warn!(
            "{}: {} ohmic pulses but {} SoC points, pairing the first {}",
            cell_id,
            pulses.len(),
            soc.len(),
            pulses.len().min(soc.len())
        );
    }
    pulses
        .iter()
        .zip(soc)
        .map(|(pulse, point)| OhmicSample {
            pulse_index: point.pulse_index,
            soc_percent: point.soc_percent,
            r0: pulse.r0,
            ocv: pulse.ocv,
        })
        .collect()
}

/// Curve over SoC built from samples listed in pulse order.
///
/// SoC is sorted ascending and the values are reversed rather than re-sorted
/// by key: pulses arrive in discharge order, so descending SoC maps one-to-one
/// onto ascending SoC read backwards.
fn curve_from_pulse_order(soc: &[f64], values: &[f64], extrapolation: Extrapolation) -> Result<ParameterCurve> {
    let mut soc_sorted = soc.to_vec();
    soc_sorted.sort_by(f64::total_cmp);
    let reversed = values.iter().rev().copied();
    ParameterCurve::fit(soc_sorted.into_iter().zip(reversed), extrapolation)
}

fn ohmic_curve(samples: &[OhmicSample], kind: ParameterKind) -> Result<ParameterCurve> {
    let soc: Vec<f64> = samples.iter().map(|s| s.soc_percent).collect();
    let values: Vec<f64> = match kind {
        ParameterKind::Ocv => samples.iter().map(|s| s.ocv).collect(),
        _ => samples.iter().map(|s| s.r0).collect(),
    };
    curve_from_pulse_order(&soc, &values, Extrapolation::Extrapolate)
}

/// Inner join of relaxation fits and SoC points on pulse id, dropping rows
/// with an undefined SoC, R_pol or tau.
pub fn merge_polarization(
    cell_id: &str,
    pulses: &[RelaxationPulse],
    soc: &[SocPoint],
) -> Result<Vec<PolarizationSample>> {
    let joined: Vec<PolarizationSample> = pulses
        .iter()
        .filter_map(|pulse| {
            soc.iter()
                .find(|point| point.pulse_index == pulse.pulse_id)
                .map(|point| PolarizationSample {
                    pulse_id: pulse.pulse_id,
                    soc_percent: point.soc_percent,
                    r_pol: pulse.r_pol,
                    tau: pulse.tau,
                })
        })
        .collect();

    if joined.is_empty() {
        return Err(ModelError::insufficient(
            format!("polarization curves of '{cell_id}'"),
            format!(
                "no pulse id shared by {} relaxation pulses and {} SoC points; step 9 and step 15 pulses do not align",
                pulses.len(),
                soc.len()
            ),
        ));
    }

    let kept: Vec<PolarizationSample> = joined
        .into_iter()
        .filter(|s| s.soc_percent.is_finite() && s.r_pol.is_finite() && s.tau.is_finite())
        .collect();
    log::debug!("{}: {} polarization samples after dropping undefined fits", cell_id, kept.len());
    Ok(kept)
}

/// R1 and tau curves of the RC branch. Both extrapolate outside the sampled
/// SoC range since relaxation pulses are sparse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolarizationCurves {
    pub r1: ParameterCurve,
    pub tau: ParameterCurve,
}

impl PolarizationCurves {
    pub fn from_samples(samples: &[PolarizationSample]) -> Result<Self> {
        Ok(PolarizationCurves {
            r1: ParameterCurve::fit(
                samples.iter().map(|s| (s.soc_percent, s.r_pol)),
                Extrapolation::Extrapolate,
            )?,
            tau: ParameterCurve::fit(samples.iter().map(|s| (s.soc_percent, s.tau)), Extrapolation::Extrapolate)?,
        })
    }
}

/// Everything extracted from one cell log.
#[derive(Debug, Clone)]
pub struct CellModel {
    pub cell_id: String,
    pub capacity_ah: f64,
    pub soc_trajectory: Vec<SocPoint>,
    pub discharge_pulses: Vec<OhmicPulse>,
    pub charge_pulses: Vec<OhmicPulse>,
    pub relaxation_pulses: Vec<RelaxationPulse>,
    pub ocv: ParameterCurve,
    pub r0_discharge: ParameterCurve,
    pub r0_charge: ParameterCurve,
    polarization: std::result::Result<PolarizationCurves, String>,
}

impl CellModel {
    /// Run the full extraction on `log`.
    ///
    /// Capacity, SoC and the OCV/R0 curves are required. The polarization
    /// curves are optional: a log without usable relaxation pulses still
    /// yields a model for the 0th-order circuit, and the failure is reported
    /// by [`CellModel::polarization`].
    pub fn from_log(log: &CellLog, config: &ExtractionConfig) -> Result<Self> {
        let cell_id = log.id().to_string();
        let capacity_ah = overall_capacity(log, config)?;
        let soc = soc_from_blocks(&coulomb_blocks(log, config), capacity_ah);

        let discharge_pulses = find_ohmic_pulses(log, config.ohmic_step(false), config);
        let charge_pulses = find_ohmic_pulses(log, config.ohmic_step(true), config);
        let discharge = pair_ohmic_with_soc(&cell_id, &discharge_pulses, &soc);
        let charge = pair_ohmic_with_soc(&cell_id, &charge_pulses, &soc);

        let ocv = ohmic_curve(&discharge, ParameterKind::Ocv)?;
        let r0_discharge = ohmic_curve(&discharge, ParameterKind::R0)?;
        let r0_charge = ohmic_curve(&charge, ParameterKind::R0)?;

        let relaxation_pulses = find_relaxation_pulses(log, config);
        let polarization = merge_polarization(&cell_id, &relaxation_pulses, &soc)
            .and_then(|samples| PolarizationCurves::from_samples(&samples))
            .map_err(|err| {
                log::warn!("{}: no polarization curves: {}", cell_id, err);
                err.to_string()
            });

        log::info!(
            "{}: {:.3} Ah, {} SoC points, {} discharge / {} charge / {} relaxation pulses",
            cell_id,
            capacity_ah,
            soc.len(),
            discharge_pulses.len(),
            charge_pulses.len(),
            relaxation_pulses.len()
        );

        Ok(CellModel {
            cell_id,
            capacity_ah,
            soc_trajectory: soc,
            discharge_pulses,
            charge_pulses,
            relaxation_pulses,
            ocv,
            r0_discharge,
            r0_charge,
            polarization,
        })
    }

    /// R1/tau curves, or the reason they could not be built.
    pub fn polarization(&self) -> Result<&PolarizationCurves> {
        self.polarization.as_ref().map_err(|reason| {
            ModelError::insufficient(format!("polarization curves of '{}'", self.cell_id), reason.clone())
        })
    }

    /// Curve of `kind`; `charge` selects the charge-pulse R0 and is ignored otherwise.
    pub fn curve(&self, kind: ParameterKind, charge: bool) -> Result<&ParameterCurve> {
        match kind {
            ParameterKind::Ocv => Ok(&self.ocv),
            ParameterKind::R0 if charge => Ok(&self.r0_charge),
            ParameterKind::R0 => Ok(&self.r0_discharge),
            ParameterKind::R1 => Ok(&self.polarization()?.r1),
            ParameterKind::Tau => Ok(&self.polarization()?.tau),
        }
    }
}

/// Single parameter curve straight from a log.
///
/// OCV and R0 come from the ohmic pulses of the charge or discharge step;
/// R1 and tau come from the relaxation fits and ignore `charge`.
pub fn parameter_curve(
    log: &CellLog,
    kind: ParameterKind,
    charge: bool,
    config: &ExtractionConfig,
) -> Result<ParameterCurve> {
    let soc = soc_trajectory(log, config)?;
    match kind {
        ParameterKind::Ocv | ParameterKind::R0 => {
            let pulses = find_ohmic_pulses(log, config.ohmic_step(charge), config);
            ohmic_curve(&pair_ohmic_with_soc(log.id(), &pulses, &soc), kind)
        }
        ParameterKind::R1 | ParameterKind::Tau => {
            let pulses = find_relaxation_pulses(log, config);
            let curves = PolarizationCurves::from_samples(&merge_polarization(log.id(), &pulses, &soc)?)?;
            Ok(if kind == ParameterKind::R1 { curves.r1 } else { curves.tau })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::Pulse;

    fn ohmic(r0: f64, ocv: f64) -> OhmicPulse {
        OhmicPulse {
            pulse: Pulse {
                pulse_index: 0,
                start_index: 0,
                end_index: 0,
                step_code: 7,
            },
            start_time: 0.0,
            delta_voltage: 0.0,
            delta_current: 0.0,
            r0,
            ocv,
        }
    }

    fn relaxation(pulse_id: usize, r_pol: f64, tau: f64) -> RelaxationPulse {
        RelaxationPulse {
            pulse: Pulse {
                pulse_index: pulse_id - 1,
                start_index: 0,
                end_index: 0,
                step_code: 9,
            },
            pulse_id,
            step_start_time: 0.0,
            step_current: 10.0,
            tau,
            r_pol,
            c_pol: tau / r_pol,
            fit: None,
        }
    }

    fn soc_points(values: &[f64]) -> Vec<SocPoint> {
        values
            .iter()
            .enumerate()
            .map(|(pulse_index, &soc_percent)| SocPoint {
                pulse_index,
                soc_percent,
            })
            .collect()
    }

    #[test]
    fn test_pairing_truncates_to_shorter() {
        let pulses = vec![ohmic(0.01, 4.1), ohmic(0.02, 3.9)];
        let soc = soc_points(&[100.0, 90.0, 80.0]);
        let paired = pair_ohmic_with_soc("cell", &pulses, &soc);
        assert_eq!(paired.len(), 2);
        assert_eq!(paired[1].soc_percent, 90.0);
        assert_eq!(paired[1].r0, 0.02);
    }

    #[test]
    fn test_pulse_order_maps_to_ascending_soc() {
        // discharge order: high SoC first
        let samples = pair_ohmic_with_soc(
            "cell",
            &[ohmic(0.010, 4.1), ohmic(0.012, 3.8), ohmic(0.015, 3.5)],
            &soc_points(&[100.0, 60.0, 20.0]),
        );
        let ocv = ohmic_curve(&samples, ParameterKind::Ocv).unwrap();
        let r0 = ohmic_curve(&samples, ParameterKind::R0).unwrap();

        assert!((ocv.evaluate(100.0) - 4.1).abs() < 1e-12);
        assert!((ocv.evaluate(20.0) - 3.5).abs() < 1e-12);
        assert!((r0.evaluate(60.0) - 0.012).abs() < 1e-12);
    }

    #[test]
    fn test_merge_joins_on_pulse_id_and_drops_nan() {
        let soc = soc_points(&[100.0, 90.0, 80.0, 70.0]);
        let pulses = vec![relaxation(1, 0.003, 12.0), relaxation(2, f64::NAN, 14.0), relaxation(3, 0.004, 15.0)];
        let merged = merge_polarization("cell", &pulses, &soc).unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].soc_percent, 90.0);
        assert_eq!(merged[1].soc_percent, 70.0);
    }

    #[test]
    fn test_empty_merge_is_an_error() {
        let soc = soc_points(&[100.0]);
        let err = merge_polarization("cell", &[relaxation(5, 0.003, 12.0)], &soc).unwrap_err();
        assert!(matches!(err, ModelError::InsufficientData { .. }));
    }

    #[test]
    fn test_polarization_curves_extrapolate() {
        let soc = soc_points(&[100.0, 90.0, 80.0]);
        let pulses = vec![relaxation(1, 0.003, 10.0), relaxation(2, 0.004, 20.0)];
        let curves = PolarizationCurves::from_samples(&merge_polarization("cell", &pulses, &soc).unwrap()).unwrap();

        // linear through (80, 0.004) and (90, 0.003)
        assert!((curves.r1.evaluate(70.0) - 0.005).abs() < 1e-12);
        assert!((curves.tau.evaluate(100.0) - 0.0).abs() < 1e-9);
    }
}
