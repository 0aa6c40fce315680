//! Pulse-test logs for a single cell.
//!
//! A log is an ordered run of samples (time, current, voltage, step code) as
//! exported by the cycler. Logs are immutable once loaded and are identified by
//! a cell id taken from the log itself (the file stem when read from disk).

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

pub const TIME_COLUMN: &str = "Total Time";
pub const CURRENT_COLUMN: &str = "Current";
pub const VOLTAGE_COLUMN: &str = "Voltage";
pub const STEP_COLUMN: &str = "Step";

/// Columns every cell log must carry. Any other column is ignored.
pub const REQUIRED_COLUMNS: [&str; 4] = [TIME_COLUMN, CURRENT_COLUMN, VOLTAGE_COLUMN, STEP_COLUMN];

/// One row of a cell log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the start of the test
    pub total_time: f64,
    /// Amps, negative while discharging
    pub current: f64,
    /// Terminal voltage (V)
    pub voltage: f64,
    /// Test-procedure step code; `None` when the cell was blank or non-integral
    pub step: Option<i32>,
}

impl Sample {
    pub fn new(total_time: f64, current: f64, voltage: f64, step: i32) -> Self {
        Sample {
            total_time,
            current,
            voltage,
            step: Some(step),
        }
    }

    pub fn is_step(&self, code: i32) -> bool {
        self.step == Some(code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellLog {
    id: String,
    samples: Vec<Sample>,
}

impl CellLog {
    pub fn new(id: impl Into<String>, samples: Vec<Sample>) -> Self {
        CellLog {
            id: id.into(),
            samples,
        }
    }

    /// Load a log from a CSV file; the cell id is the file stem.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file = std::fs::File::open(path)?;
        let log = Self::from_reader(id, file)?;
        log::debug!("loaded {} samples for cell '{}' from {}", log.len(), log.id, path.display());
        Ok(log)
    }

    /// Parse CSV text. Header names are whitespace-trimmed; cells that are not
    /// numbers become `NaN` instead of failing the load.
    pub fn from_reader<R: Read>(id: impl Into<String>, reader: R) -> Result<Self> {
        let id = id.into();
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let column = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| ModelError::MissingColumn {
                    source_name: id.clone(),
                    column: name.to_string(),
                    found: headers.clone(),
                })
        };
        let time_idx = column(TIME_COLUMN)?;
        let current_idx = column(CURRENT_COLUMN)?;
        let voltage_idx = column(VOLTAGE_COLUMN)?;
        let step_idx = column(STEP_COLUMN)?;

        let mut samples = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let numeric = |idx: usize| parse_numeric(record.get(idx));
            samples.push(Sample {
                total_time: numeric(time_idx),
                current: numeric(current_idx),
                voltage: numeric(voltage_idx),
                step: step_code(numeric(step_idx)),
            });
        }

        Ok(CellLog { id, samples })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Indices where the step code switches onto `code` from anything else.
    /// The first sample never counts as an edge since it has no predecessor.
    pub fn rising_edges(&self, code: i32) -> Vec<usize> {
        (1..self.samples.len())
            .filter(|&i| self.samples[i].is_step(code) && !self.samples[i - 1].is_step(code))
            .collect()
    }

    /// Contiguous `[start, end]` index ranges (inclusive) where the step equals `code`.
    pub fn step_blocks(&self, code: i32) -> Vec<(usize, usize)> {
        let mut blocks = Vec::new();
        let mut open: Option<usize> = None;
        for (i, sample) in self.samples.iter().enumerate() {
            match (sample.is_step(code), open) {
                (true, None) => open = Some(i),
                (false, Some(start)) => {
                    blocks.push((start, i - 1));
                    open = None;
                }
                _ => {}
            }
        }
        if let Some(start) = open {
            blocks.push((start, self.samples.len() - 1));
        }
        blocks
    }

    /// Indices of the samples with `t_min <= total_time <= t_max`.
    pub fn window_indices(&self, t_min: f64, t_max: f64) -> Vec<usize> {
        self.samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.total_time >= t_min && s.total_time <= t_max)
            .map(|(i, _)| i)
            .collect()
    }
}

fn parse_numeric(field: Option<&str>) -> f64 {
    field
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

fn step_code(value: f64) -> Option<i32> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() <= i32::MAX as f64 {
        Some(value as i32)
    } else {
        None
    }
}
