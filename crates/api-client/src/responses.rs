use rust_decimal::Decimal;
use serde::Deserialize;

/// The response from `GET /fapi/v1/ticker/price?symbol=...`.
///
/// Binance sends the price as a string, e.g. `"47800.10"`; `Decimal` parses it
/// without going through a float.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerPriceResponse {
    pub symbol: String,
    pub price: Decimal,
    #[serde(default)]
    pub time: Option<i64>,
}

/// Represents an error response from the Binance API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub code: i32,
    pub msg: String,
}

impl ApiErrorResponse {
    /// `-1121 Invalid symbol.`: the market does not exist, so there is no price to give.
    pub const INVALID_SYMBOL: i32 = -1121;

    pub fn is_unknown_symbol(&self) -> bool {
        self.code == Self::INVALID_SYMBOL
    }
}
