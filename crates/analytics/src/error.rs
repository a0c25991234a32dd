use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error(
        "Unknown statistics dimension '{0}' (expected scanner_source, tier, interval or direction)"
    )]
    UnknownDimension(String),
}
