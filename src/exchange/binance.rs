use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::prelude::*;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::ExchangeGateway;
use crate::error::ExchangeError;
use crate::models::{OrderAck, OrderSide, TradingPair};

pub const BINANCE_API_BASE: &str = "https://api.binance.com";
const RECV_WINDOW_MS: u64 = 5000;
const REQUEST_TIMEOUT_SECS: u64 = 10;
const QUANTITY_DECIMALS: u32 = 8;

type HmacSha256 = Hmac<Sha256>;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance spot REST client
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    rate_limiter: Arc<BinanceRateLimiter>,
    lot_sizes: Arc<Mutex<HashMap<String, LotSize>>>,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    executed_qty: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    #[serde(default)]
    min_qty: Option<String>,
    #[serde(default)]
    step_size: Option<String>,
}

/// Quantity rules from a symbol's LOT_SIZE filter
#[derive(Debug, Clone, Copy, PartialEq)]
struct LotSize {
    step: Decimal,
    min_qty: Decimal,
}

impl LotSize {
    /// Used when a symbol publishes no LOT_SIZE filter
    fn fallback() -> Self {
        Self {
            step: Decimal::new(1, QUANTITY_DECIMALS),
            min_qty: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

impl BinanceClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        requests_per_minute: u32,
    ) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(per_minute);

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            lot_sizes: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Unsigned market-data request
    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "Binance public request");

        let response = self.client.get(&url).query(params).send().await?;
        parse_response(response).await
    }

    /// Signed account/trade request (HMAC-SHA256 over the query string)
    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let mut query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "recvWindow={}&timestamp={}",
            RECV_WINDOW_MS,
            chrono::Utc::now().timestamp_millis()
        ));

        let signature = sign(&self.secret_key, &query)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);
        tracing::debug!(path = %path, method = %method, "Binance signed request");

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        parse_response(response).await
    }

    /// LOT_SIZE rules for the pair, fetched once per symbol and cached
    async fn lot_size(&self, pair: &TradingPair) -> Result<LotSize, ExchangeError> {
        let symbol = pair.symbol();
        if let Some(lot) = self.cached_lot_size(&symbol) {
            return Ok(lot);
        }

        let info: ExchangeInfo = self
            .public_get("/api/v3/exchangeInfo", &[("symbol", symbol.clone())])
            .await?;
        let lot = parse_lot_size(&info, &symbol)?;
        tracing::debug!(symbol = %symbol, step = %lot.step, min_qty = %lot.min_qty, "Cached LOT_SIZE filter");

        self.lot_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol, lot);
        Ok(lot)
    }

    fn cached_lot_size(&self, symbol: &str) -> Option<LotSize> {
        self.lot_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .copied()
    }

    async fn market_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        base_quantity: f64,
    ) -> Result<OrderAck, ExchangeError> {
        let lot = self.lot_size(pair).await?;
        let quantity = format_quantity(base_quantity, lot)?;
        let params = [
            ("symbol", pair.symbol()),
            ("side", side.to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity),
            ("newClientOrderId", uuid::Uuid::new_v4().simple().to_string()),
        ];

        let response: OrderResponse = self
            .signed_request(Method::POST, "/api/v3/order", &params)
            .await?;

        if matches!(response.status.as_str(), "REJECTED" | "EXPIRED") {
            return Err(ExchangeError::Rejected(format!(
                "order {} for {} ended {}",
                response.order_id, pair, response.status
            )));
        }

        Ok(OrderAck {
            order_id: response.order_id.to_string(),
            executed_quantity: parse_number(&response.executed_qty)?,
        })
    }
}

#[async_trait]
impl ExchangeGateway for BinanceClient {
    async fn last_price(&self, pair: &TradingPair) -> Result<f64, ExchangeError> {
        let ticker: TickerPrice = self
            .public_get("/api/v3/ticker/price", &[("symbol", pair.symbol())])
            .await?;
        parse_number(&ticker.price)
    }

    async fn recent_closes(
        &self,
        pair: &TradingPair,
        interval: &str,
        count: usize,
    ) -> Result<Vec<f64>, ExchangeError> {
        let klines: Vec<Vec<serde_json::Value>> = self
            .public_get(
                "/api/v3/klines",
                &[
                    ("symbol", pair.symbol()),
                    ("interval", interval.to_string()),
                    ("limit", count.to_string()),
                ],
            )
            .await?;

        // Kline layout: [open_time, open, high, low, close, volume, ...]
        klines
            .iter()
            .map(|kline| {
                kline
                    .get(4)
                    .and_then(|close| close.as_str())
                    .ok_or_else(|| ExchangeError::Decode("kline without close price".to_string()))
                    .and_then(parse_number)
            })
            .collect()
    }

    async fn free_balance(&self, asset: &str) -> Result<f64, ExchangeError> {
        let account: AccountInfo = self
            .signed_request(Method::GET, "/api/v3/account", &[])
            .await?;

        match account
            .balances
            .iter()
            .find(|b| b.asset.eq_ignore_ascii_case(asset))
        {
            Some(balance) => parse_number(&balance.free),
            None => Ok(0.0),
        }
    }

    async fn market_buy(
        &self,
        pair: &TradingPair,
        base_quantity: f64,
    ) -> Result<OrderAck, ExchangeError> {
        self.market_order(pair, OrderSide::Buy, base_quantity).await
    }

    async fn market_sell(
        &self,
        pair: &TradingPair,
        base_quantity: f64,
    ) -> Result<OrderAck, ExchangeError> {
        self.market_order(pair, OrderSide::Sell, base_quantity).await
    }
}

async fn parse_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ExchangeError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(err) => ExchangeError::Api {
                code: err.code,
                msg: err.msg,
            },
            Err(_) => ExchangeError::Api {
                code: i64::from(status.as_u16()),
                msg: body,
            },
        });
    }

    serde_json::from_str(&body).map_err(|e| ExchangeError::Decode(e.to_string()))
}

fn parse_number(raw: &str) -> Result<f64, ExchangeError> {
    raw.parse::<f64>()
        .map_err(|e| ExchangeError::Decode(format!("'{}' is not a number: {}", raw, e)))
}

/// Hex-encoded HMAC-SHA256 of the query string
fn sign(secret: &str, query: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Auth(e.to_string()))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn parse_lot_size(info: &ExchangeInfo, symbol: &str) -> Result<LotSize, ExchangeError> {
    let symbol_info = info
        .symbols
        .iter()
        .find(|s| s.symbol == symbol)
        .ok_or_else(|| ExchangeError::MissingData(format!("exchange info for {}", symbol)))?;

    let Some(filter) = symbol_info
        .filters
        .iter()
        .find(|f| f.filter_type == "LOT_SIZE")
    else {
        return Ok(LotSize::fallback());
    };

    let step = parse_decimal(filter.step_size.as_deref())?;
    let min_qty = parse_decimal(filter.min_qty.as_deref())?;
    Ok(LotSize {
        // A zero step means the symbol does not restrict increments
        step: if step.is_zero() {
            LotSize::fallback().step
        } else {
            step
        },
        min_qty,
    })
}

fn parse_decimal(raw: Option<&str>) -> Result<Decimal, ExchangeError> {
    let raw = raw.ok_or_else(|| ExchangeError::Decode("LOT_SIZE filter missing a field".to_string()))?;
    raw.parse::<Decimal>()
        .map_err(|e| ExchangeError::Decode(format!("'{}' is not a decimal: {}", raw, e)))
}

/// Truncate down to the lot step (never round up) so a sell of the full
/// balance cannot exceed it
fn format_quantity(quantity: f64, lot: LotSize) -> Result<String, ExchangeError> {
    let decimal = Decimal::from_f64(quantity)
        .filter(|d| d.is_sign_positive() && !d.is_zero())
        .ok_or_else(|| ExchangeError::Rejected(format!("invalid order quantity {}", quantity)))?;

    let truncated = ((decimal / lot.step).trunc() * lot.step).normalize();
    if truncated.is_zero() || truncated < lot.min_qty {
        return Err(ExchangeError::Rejected(format!(
            "order quantity {} below LOT_SIZE minimum {} (step {})",
            quantity,
            lot.min_qty.normalize(),
            lot.step.normalize()
        )));
    }

    Ok(truncated.to_string())
}
