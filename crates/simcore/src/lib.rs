//! Shared core for the cell-model workspace: log data, configuration,
//! errors and the stepping traits implemented by the circuit models.

pub mod cell_log;
pub mod config;
pub mod error;
pub mod traits;

pub use cell_log::{CellLog, Sample, REQUIRED_COLUMNS};
pub use config::{ExtractionConfig, PackConfig, SimulationConfig};
pub use error::{ModelError, Result};
pub use traits::*;
