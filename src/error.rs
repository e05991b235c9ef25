use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("data unavailable for {source_key}: {reason}")]
    DataUnavailable { source_key: String, reason: String },
    #[error("column '{column}' not found in {dataset}")]
    UnknownColumn { dataset: String, column: String },
    #[error("unknown dataset '{0}'")]
    UnknownDataset(String),
    #[error("unknown page '{0}'")]
    UnknownPage(String),
}

impl PipelineError {
    pub fn unavailable(source_key: impl ToString, reason: impl ToString) -> Self {
        PipelineError::DataUnavailable {
            source_key: source_key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Failures a page renders as an inline message instead of aborting.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            PipelineError::DataUnavailable { .. } | PipelineError::UnknownColumn { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("table '{0}' not found")]
    TableNotFound(String),
    #[error("invalid table name '{0}'")]
    InvalidTableName(String),
    #[error("query failed: {0}")]
    Query(String),
}
