//! Integration tests for the Binance ticker price oracle against a mocked REST endpoint.
use api_client::error::ApiError;
use api_client::{BinanceClient, PriceOracle};
use rust_decimal_macros::dec;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> BinanceClient {
    BinanceClient::with_base_url(&server.uri(), "USDT", Duration::from_secs(2))
        .expect("client builds")
}

#[tokio::test]
async fn returns_ticker_price_for_bare_symbol() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/ticker/price"))
        .and(query_param("symbol", "BTCUSDT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "symbol": "BTCUSDT",
            "price": "47800.10",
            "time": 1704067200000i64
        })))
        .expect(1)
        .mount(&server)
        .await;

    let price = client_for(&server).current_price("btc").await.unwrap();
    assert_eq!(price, Some(dec!(47800.10)));
}

#[tokio::test]
async fn unknown_symbol_is_reported_as_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/ticker/price"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": -1121,
            "msg": "Invalid symbol."
        })))
        .mount(&server)
        .await;

    let price = client_for(&server).current_price("NOPE").await.unwrap();
    assert_eq!(price, None);
}

#[tokio::test]
async fn other_exchange_errors_are_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/ticker/price"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "code": -1003,
            "msg": "Too many requests."
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).current_price("ETH").await.unwrap_err();
    assert!(matches!(err, ApiError::Exchange { code: -1003, .. }));
}

#[tokio::test]
async fn slow_exchange_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/ticker/price"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "symbol": "BTCUSDT", "price": "1" }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client =
        BinanceClient::with_base_url(&server.uri(), "USDT", Duration::from_millis(50)).unwrap();
    let err = client.current_price("BTC").await.unwrap_err();
    assert!(matches!(err, ApiError::Http(_)));
}
