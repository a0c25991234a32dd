use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CoreError {
    /// A textual enum value (direction, outcome, interval, state) did not parse.
    #[error("'{value}' is not a valid {kind}")]
    Unrecognised { kind: &'static str, value: String },

    #[error("Entry price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    /// Decimal overflow while computing a percentage.
    #[error("P&L calculation overflowed: {0}")]
    Calculation(String),
}
