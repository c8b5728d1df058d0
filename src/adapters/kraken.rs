use super::ExchangeCredentials;
use crate::domain::model::{Candle, Timeframe};
use crate::domain::ports::MarketDataSource;
use crate::utils::error::{Result, TrandError};
use crate::utils::retry::{with_retry, RetryPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://api.kraken.com";
const SERVICE: &str = "kraken";

#[derive(Debug, Deserialize)]
struct OhlcResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: serde_json::Map<String, Value>,
}

pub struct KrakenClient {
    client: Client,
    base_url: String,
    credentials: ExchangeCredentials,
    retry: RetryPolicy,
}

impl KrakenClient {
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

    /// `BTC/USDT` -> `XBTUSDT`
    pub fn market_symbol(symbol: &str) -> String {
        let upper = symbol.to_uppercase();
        let (base, quote) = upper
            .split_once(['/', '-'])
            .unwrap_or((upper.as_str(), ""));
        let base = if base == "BTC" { "XBT" } else { base };
        format!("{}{}", base, quote)
    }

    async fn request_ohlc(&self, pair: &str, interval: u32) -> Result<Vec<Value>> {
        let url = format!("{}/0/public/OHLC", self.base_url);
        let interval = interval.to_string();

        tracing::debug!("Requesting OHLC {} interval {} from {}", pair, interval, url);
        let response = self
            .client
            .get(&url)
            .query(&[("pair", pair), ("interval", interval.as_str())])
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

        let body: OhlcResponse = response.json().await?;
        if !body.error.is_empty() {
            let message = body.error.join("; ");
            if message.contains("EAPI:Rate limit") {
                return Err(TrandError::RateLimitError {
                    service: SERVICE.to_string(),
                });
            }
            return Err(TrandError::ApiError {
                service: SERVICE.to_string(),
                message,
            });
        }

        // result 的 key 是 Kraken 內部的 pair 名稱 (例如 XXBTZUSD)，另有 "last"
        body.result
            .into_iter()
            .find(|(key, _)| key != "last")
            .and_then(|(_, rows)| match rows {
                Value::Array(rows) => Some(rows),
                _ => None,
            })
            .ok_or_else(|| TrandError::InvalidResponseError {
                service: SERVICE.to_string(),
                message: format!("no OHLC rows for {}", pair),
            })
    }
}

fn number(value: &Value, field: &str) -> Result<f64> {
    let parsed = match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.ok_or_else(|| TrandError::InvalidResponseError {
        service: SERVICE.to_string(),
        message: format!("{} is not a number: {}", field, value),
    })
}

/// Kraken rows: `[time, open, high, low, close, vwap, volume, count]`, oldest first.
fn parse_rows(rows: &[Value], limit: usize) -> Result<Vec<Candle>> {
    let start = rows.len().saturating_sub(limit);
    rows[start..]
        .iter()
        .map(|row| {
            let fields = row
                .as_array()
                .filter(|f| f.len() >= 7)
                .ok_or_else(|| TrandError::InvalidResponseError {
                    service: SERVICE.to_string(),
                    message: format!("malformed OHLC row: {}", row),
                })?;
            let secs = fields[0].as_i64().ok_or_else(|| TrandError::InvalidResponseError {
                service: SERVICE.to_string(),
                message: format!("time is not an integer: {}", fields[0]),
            })?;
            let open_time = DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
                TrandError::InvalidResponseError {
                    service: SERVICE.to_string(),
                    message: format!("time {} out of range", secs),
                }
            })?;
            Ok(Candle {
                open_time,
                open: number(&fields[1], "open")?,
                high: number(&fields[2], "high")?,
                low: number(&fields[3], "low")?,
                close: number(&fields[4], "close")?,
                volume: number(&fields[6], "volume")?,
            })
        })
        .collect()
}

#[async_trait]
impl MarketDataSource for KrakenClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let interval = timeframe
            .kraken_interval()
            .ok_or_else(|| TrandError::UnsupportedTimeframe {
                exchange: SERVICE.to_string(),
                timeframe: timeframe.to_string(),
            })?;
        let pair = Self::market_symbol(symbol);

        let rows = with_retry(self.retry, "Kraken OHLC request", || {
            self.request_ohlc(&pair, interval)
        })
        .await?;

        let candles = parse_rows(&rows, limit)?;
        tracing::debug!("Fetched {} {} candles for {} from Kraken", candles.len(), timeframe, pair);
        Ok(candles)
    }
}
