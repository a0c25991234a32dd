use crate::error::ApiError;
use async_trait::async_trait;
use configuration::PriceOracleSettings;
use rust_decimal::Decimal;
use std::time::Duration;

pub mod error;
pub mod responses;
// --- Public API ---
pub use responses::{ApiErrorResponse, TickerPriceResponse};

/// The narrow price lookup the outcome evaluator depends on.
///
/// `Ok(None)` means the source has no price for the symbol. Callers treat it
/// the same way as an error: the check is skipped, never guessed.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn current_price(&self, symbol: &str) -> Result<Option<Decimal>, ApiError>;
}

/// A `PriceOracle` backed by the Binance USD-M futures ticker endpoint.
#[derive(Clone)]
pub struct BinanceClient {
    client: reqwest::Client,
    base_url: String,
    quote_asset: String,
}

impl BinanceClient {
    pub fn new(settings: &PriceOracleSettings) -> Result<Self, ApiError> {
        Self::with_base_url(
            &settings.base_url,
            &settings.quote_asset,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    pub fn with_base_url(
        base_url: &str,
        quote_asset: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            quote_asset: quote_asset.trim().to_ascii_uppercase(),
        })
    }

    /// Maps a tracked symbol to the exchange market, e.g. `BTC` -> `BTCUSDT`.
    /// Symbols that already carry the quote asset are passed through.
    pub fn market_symbol(&self, symbol: &str) -> String {
        let symbol = symbol.trim().to_ascii_uppercase();
        if self.quote_asset.is_empty()
            || (symbol.len() > self.quote_asset.len() && symbol.ends_with(&self.quote_asset))
        {
            symbol
        } else {
            format!("{}{}", symbol, self.quote_asset)
        }
    }
}

#[async_trait]
impl PriceOracle for BinanceClient {
    async fn current_price(&self, symbol: &str) -> Result<Option<Decimal>, ApiError> {
        let market = self.market_symbol(symbol);
        let url = format!("{}/fapi/v1/ticker/price", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", market.as_str())])
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let api_error: ApiErrorResponse = serde_json::from_str(&text).map_err(|e| {
                ApiError::Deserialization(format!(
                    "Failed to deserialize error response ({}): {}. Original text: {}",
                    status, e, text
                ))
            })?;
            if api_error.is_unknown_symbol() {
                tracing::debug!(symbol = %market, "Exchange does not list symbol");
                return Ok(None);
            }
            return Err(ApiError::Exchange {
                code: api_error.code,
                msg: api_error.msg,
            });
        }

        let ticker: TickerPriceResponse =
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialization(e.to_string()))?;
        if ticker.price <= Decimal::ZERO {
            return Err(ApiError::InvalidData(format!(
                "non-positive price {} for {}",
                ticker.price, ticker.symbol
            )));
        }
        Ok(Some(ticker.price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_symbol_appends_quote_asset_once() {
        let client =
            BinanceClient::with_base_url("http://localhost", "usdt", Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.market_symbol("btc"), "BTCUSDT");
        assert_eq!(client.market_symbol("ETHUSDT"), "ETHUSDT");
        assert_eq!(client.market_symbol("USDT"), "USDTUSDT");
    }
}
