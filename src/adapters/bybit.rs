use super::ExchangeCredentials;
use crate::domain::model::{Candle, Timeframe};
use crate::domain::ports::MarketDataSource;
use crate::utils::error::{Result, TrandError};
use crate::utils::retry::{with_retry, RetryPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://api.bybit.com";
const SERVICE: &str = "bybit";
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KlineResponse {
    ret_code: i64,
    ret_msg: String,
    result: Option<KlineResult>,
}

#[derive(Debug, Deserialize)]
struct KlineResult {
    #[serde(default)]
    list: Vec<Vec<String>>,
}

pub struct BybitClient {
    client: Client,
    base_url: String,
    credentials: ExchangeCredentials,
    retry: RetryPolicy,
}

impl BybitClient {
    pub fn new(client: Client, base_url: impl Into<String>, credentials: ExchangeCredentials) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_configured()
    }

    /// `BTC/USDT` -> `BTCUSDT`
    pub fn market_symbol(symbol: &str) -> String {
        symbol.replace(['/', '-'], "").to_uppercase()
    }

    async fn request_klines(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Vec<String>>> {
        let url = format!("{}/v5/market/kline", self.base_url);
        let limit = limit.clamp(1, MAX_LIMIT).to_string();

        tracing::debug!("Requesting {} klines {} {} from {}", limit, symbol, interval, url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("category", "spot"),
                ("symbol", symbol),
                ("interval", interval),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TrandError::RateLimitError {
                service: SERVICE.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrandError::ApiStatusError {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body: KlineResponse = response.json().await?;
        if body.ret_code != 0 {
            // 10006: 超出請求頻率
            if body.ret_code == 10006 {
                return Err(TrandError::RateLimitError {
                    service: SERVICE.to_string(),
                });
            }
            return Err(TrandError::ApiError {
                service: SERVICE.to_string(),
                message: format!("retCode {}: {}", body.ret_code, body.ret_msg),
            });
        }

        Ok(body.result.map(|r| r.list).unwrap_or_default())
    }
}

fn parse_number(field: &str, raw: &str) -> Result<f64> {
    raw.parse::<f64>().map_err(|e| TrandError::InvalidResponseError {
        service: SERVICE.to_string(),
        message: format!("{} '{}' is not a number: {}", field, raw, e),
    })
}

/// Bybit rows: `[startTime, open, high, low, close, volume, turnover]`, newest first.
fn parse_rows(rows: Vec<Vec<String>>) -> Result<Vec<Candle>> {
    let mut candles = rows
        .iter()
        .map(|row| {
            if row.len() < 6 {
                return Err(TrandError::InvalidResponseError {
                    service: SERVICE.to_string(),
                    message: format!("kline row has {} fields, expected 7", row.len()),
                });
            }
            let millis = row[0].parse::<i64>().map_err(|e| TrandError::InvalidResponseError {
                service: SERVICE.to_string(),
                message: format!("startTime '{}': {}", row[0], e),
            })?;
            let open_time = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
                TrandError::InvalidResponseError {
                    service: SERVICE.to_string(),
                    message: format!("startTime {} out of range", millis),
                }
            })?;
            Ok(Candle {
                open_time,
                open: parse_number("open", &row[1])?,
                high: parse_number("high", &row[2])?,
                low: parse_number("low", &row[3])?,
                close: parse_number("close", &row[4])?,
                volume: parse_number("volume", &row[5])?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    candles.sort_by_key(|c| c.open_time);
    Ok(candles)
}

#[async_trait]
impl MarketDataSource for BybitClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let market = Self::market_symbol(symbol);
        let interval = timeframe.bybit_interval();

        let rows = with_retry(self.retry, "Bybit kline request", || {
            self.request_klines(&market, interval, limit)
        })
        .await?;

        let candles = parse_rows(rows)?;
        tracing::debug!("Fetched {} {} candles for {} from Bybit", candles.len(), timeframe, market);
        Ok(candles)
    }
}
