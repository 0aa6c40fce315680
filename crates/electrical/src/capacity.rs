//! Total capacity and coulomb-counted state of charge.

use serde::{Deserialize, Serialize};
use simcore::{CellLog, ExtractionConfig, ModelError, Result};

use crate::pulse::Pulse;

/// State of charge before a pulse. Pulse 0 is the fully charged start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SocPoint {
    pub pulse_index: usize,
    pub soc_percent: f64,
}

/// One contiguous constant-current block between pulses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoulombBlock {
    pub pulse: Pulse,
    /// Seconds between the first and last sample of the block
    pub duration: f64,
    /// Current of the first sample (A)
    pub current: f64,
    /// Charge moved during the block (Ah)
    pub delta_capacity_ah: f64,
}

/// Capacity (Ah) from the constant-current full-discharge step.
///
/// Uses the first and last sample carrying the capacity step code and the
/// current of the first one.
pub fn overall_capacity(log: &CellLog, config: &ExtractionConfig) -> Result<f64> {
    let code = config.capacity_step;
    let mut block = log.samples().iter().filter(|s| s.is_step(code));
    let first = block
        .next()
        .ok_or_else(|| ModelError::data(log.id(), format!("no step {code} samples for the capacity measurement")))?;
    let last = block.last().unwrap_or(first);

    if first.current == 0.0 {
        return Err(ModelError::data(log.id(), format!("step {code} block has zero current")));
    }

    let capacity = (first.current * (last.total_time - first.total_time) / 3600.0).abs();
    if !capacity.is_finite() || capacity == 0.0 {
        return Err(ModelError::data(
            log.id(),
            format!("step {code} block gives a degenerate capacity of {capacity} Ah"),
        ));
    }
    Ok(capacity)
}

/// Contiguous coulomb-counting blocks in log order.
pub fn coulomb_blocks(log: &CellLog, config: &ExtractionConfig) -> Vec<CoulombBlock> {
    let samples = log.samples();
    log.step_blocks(config.coulomb_step)
        .into_iter()
        .enumerate()
        .map(|(i, (start, end))| {
            let duration = samples[end].total_time - samples[start].total_time;
            let current = samples[start].current;
            CoulombBlock {
                pulse: Pulse {
                    pulse_index: i,
                    start_index: start,
                    end_index: end,
                    step_code: config.coulomb_step,
                },
                duration,
                current,
                delta_capacity_ah: (duration * current / 3600.0).abs(),
            }
        })
        .collect()
}

/// SoC before every pulse, starting at 100 % and dropping by each block's
/// share of `capacity_ah`. Not clamped at zero.
pub fn soc_from_blocks(blocks: &[CoulombBlock], capacity_ah: f64) -> Vec<SocPoint> {
    let mut points = Vec::with_capacity(blocks.len() + 1);
    let mut soc = 100.0;
    points.push(SocPoint {
        pulse_index: 0,
        soc_percent: soc,
    });
    for (i, block) in blocks.iter().enumerate() {
        soc -= block.delta_capacity_ah / capacity_ah * 100.0;
        points.push(SocPoint {
            pulse_index: i + 1,
            soc_percent: soc,
        });
    }
    points
}

/// SoC trajectory of a log, measuring its capacity first.
pub fn soc_trajectory(log: &CellLog, config: &ExtractionConfig) -> Result<Vec<SocPoint>> {
    let capacity = overall_capacity(log, config)?;
    Ok(soc_from_blocks(&coulomb_blocks(log, config), capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use simcore::Sample;

    /// Two coulomb blocks of 360 s at -10 A (1 Ah each) and a 3600 s step-27
    /// discharge at -20 A (20 Ah).
    fn synthetic_log() -> CellLog {
        let mut samples = Vec::new();
        let mut t = 0.0;
        let mut push = |n: usize, current: f64, step: i32, samples: &mut Vec<Sample>| {
            for _ in 0..n {
                samples.push(Sample::new(t, current, 4.0, step));
                t += 1.0;
            }
        };
        push(5, 0.0, 1, &mut samples);
        push(361, -10.0, 15, &mut samples);
        push(5, 0.0, 1, &mut samples);
        push(361, -10.0, 15, &mut samples);
        push(5, 0.0, 1, &mut samples);
        push(3601, -20.0, 27, &mut samples);
        CellLog::new("synthetic", samples)
    }

    #[test]
    fn test_capacity_matches_current_times_duration() {
        let capacity = overall_capacity(&synthetic_log(), &ExtractionConfig::default()).unwrap();
        assert!((capacity - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_capacity_requires_step_27() {
        let log = CellLog::new("empty", vec![Sample::new(0.0, -1.0, 4.0, 1)]);
        let err = overall_capacity(&log, &ExtractionConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::Data { .. }));
    }

    #[test]
    fn test_capacity_rejects_zero_current() {
        let log = CellLog::new(
            "zero",
            vec![Sample::new(0.0, 0.0, 4.0, 27), Sample::new(10.0, 0.0, 4.0, 27)],
        );
        assert!(overall_capacity(&log, &ExtractionConfig::default()).is_err());
    }

    #[test]
    fn test_soc_starts_at_100_and_decreases() {
        let points = soc_trajectory(&synthetic_log(), &ExtractionConfig::default()).unwrap();

        assert_eq!(points.len(), 3);
        assert_eq!(points[0].pulse_index, 0);
        assert_eq!(points[0].soc_percent, 100.0);
        assert!((points[1].soc_percent - 95.0).abs() < 1e-9);
        assert!((points[2].soc_percent - 90.0).abs() < 1e-9);
        for pair in points.windows(2) {
            assert!(pair[1].soc_percent <= pair[0].soc_percent);
        }
    }

    #[test]
    fn test_blocks_use_first_current_sample() {
        let blocks = coulomb_blocks(&synthetic_log(), &ExtractionConfig::default());
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].pulse.start_index, 5);
        assert_eq!(blocks[0].pulse.end_index, 365);
        assert!((blocks[0].duration - 360.0).abs() < 1e-12);
        assert!((blocks[0].delta_capacity_ah - 1.0).abs() < 1e-12);
    }
}
