use thiserror::Error;

/// Errors raised while loading logs, extracting parameters or configuring a run.
///
/// Per-pulse fit failures are reported as [`ModelError::FitConvergence`] by the
/// fitting routine, but the pulse extractor absorbs them into `NaN` values so
/// they never abort a whole extraction.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{source_name}: missing required column '{column}' (found columns: {found:?})")]
    MissingColumn {
        source_name: String,
        column: String,
        found: Vec<String>,
    },

    #[error("data error in cell '{cell}': {reason}")]
    Data { cell: String, reason: String },

    #[error("insufficient data for {what}: {reason}")]
    InsufficientData { what: String, reason: String },

    #[error("exponential fit did not converge after {iterations} evaluations: {reason}")]
    FitConvergence { iterations: usize, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ModelError {
    pub fn data(cell: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::Data {
            cell: cell.into(),
            reason: reason.into(),
        }
    }

    pub fn insufficient(what: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::InsufficientData {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_error_names_the_cell() {
        let err = ModelError::data("CELL_E_TEST_03", "no step 27 samples");
        let message = err.to_string();
        assert!(message.contains("CELL_E_TEST_03"));
        assert!(message.contains("no step 27 samples"));
    }

    #[test]
    fn missing_column_lists_found_headers() {
        let err = ModelError::MissingColumn {
            source_name: "cell.csv".to_string(),
            column: "Step".to_string(),
            found: vec!["Total Time".to_string(), "Voltage".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("'Step'"));
        assert!(message.contains("Total Time"));
    }
}
