use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid signal: {field} {reason}")]
    InvalidSignal { field: &'static str, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] database::DbError),

    #[error("Outcome calculation failed: {0}")]
    Calculation(#[from] core_types::CoreError),
}

impl EngineError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidSignal {
            field,
            reason: reason.into(),
        }
    }
}
