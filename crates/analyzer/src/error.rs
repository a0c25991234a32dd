use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Statistics window must cover at least one day, got {0}")]
    InvalidWindow(u32),

    #[error("Failed to read outcomes for aggregation: {0}")]
    Aggregation(#[from] database::DbError),
}
