//! State of health against a brand-new baseline cell, and the pack range it implies.

use std::collections::BTreeMap;

use mechanics::DriveCycleResult;
use serde::{Deserialize, Serialize};
use simcore::{CellLog, ExtractionConfig, ModelError, PackConfig, Result};

use crate::analysis::simulate_0th_order;
use crate::capacity::overall_capacity;
use crate::parameters::CellModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeEstimate {
    pub cell_id: String,
    pub soh_percent: f64,
    /// Distance covered before the pack is depleted (m)
    pub range_m: f64,
}

fn soh_percent(capacity_ah: f64, baseline_ah: f64) -> f64 {
    capacity_ah / baseline_ah * 100.0
}

/// SoH (%) of every log, keyed by cell id, relative to the log `baseline_id`.
pub fn soh_by_cell(logs: &[CellLog], baseline_id: &str, config: &ExtractionConfig) -> Result<BTreeMap<String, f64>> {
    let baseline = logs
        .iter()
        .find(|log| log.id() == baseline_id)
        .ok_or_else(|| ModelError::data(baseline_id, "baseline cell is not among the loaded logs"))?;
    let baseline_ah = overall_capacity(baseline, config)?;

    logs.iter()
        .map(|log| {
            let capacity = overall_capacity(log, config)?;
            Ok((log.id().to_string(), soh_percent(capacity, baseline_ah)))
        })
        .collect()
}

/// Pack range per cell from a 0th-order discharge to depletion.
///
/// Results follow the order of `models`.
pub fn range_vs_soh(
    models: &[CellModel],
    baseline_id: &str,
    demand: &DriveCycleResult,
    pack: &PackConfig,
) -> Result<Vec<RangeEstimate>> {
    let baseline = models
        .iter()
        .find(|model| model.cell_id == baseline_id)
        .ok_or_else(|| ModelError::data(baseline_id, "baseline cell is not among the extracted models"))?;

    models
        .iter()
        .map(|model| {
            let result = simulate_0th_order(model, demand, pack)?;
            let estimate = RangeEstimate {
                cell_id: model.cell_id.clone(),
                soh_percent: soh_percent(model.capacity_ah, baseline.capacity_ah),
                range_m: result.range_m(),
            };
            log::info!(
                "{}: SoH {:.1} %, range {:.1} km",
                estimate.cell_id,
                estimate.soh_percent,
                estimate.range_m / 1000.0
            );
            Ok(estimate)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use simcore::Sample;

    fn capacity_log(id: &str, current: f64, seconds: usize) -> CellLog {
        let mut samples = vec![Sample::new(0.0, 0.0, 4.1, 1)];
        for k in 0..=seconds {
            samples.push(Sample::new(1.0 + k as f64, current, 4.0, 27));
        }
        CellLog::new(id, samples)
    }

    #[test]
    fn test_baseline_against_itself_is_100() {
        let logs = vec![capacity_log("new", -10.0, 3600), capacity_log("aged", -10.0, 2880)];
        let soh = soh_by_cell(&logs, "new", &ExtractionConfig::default()).unwrap();

        assert_eq!(soh["new"], 100.0);
        assert!((soh["aged"] - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_baseline_is_a_data_error() {
        let logs = vec![capacity_log("aged", -10.0, 2880)];
        let err = soh_by_cell(&logs, "new", &ExtractionConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::Data { .. }));
    }

    #[test]
    fn test_log_without_capacity_block_fails() {
        let logs = vec![
            capacity_log("new", -10.0, 3600),
            CellLog::new("broken", vec![Sample::new(0.0, 0.0, 4.0, 1)]),
        ];
        assert!(soh_by_cell(&logs, "new", &ExtractionConfig::default()).is_err());
    }
}
