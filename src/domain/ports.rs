use crate::domain::model::{Candle, CandleSeries, ChatMessage, MarketReport, Timeframe};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn append_line(
        &self,
        path: &str,
        line: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Candles for `symbol` (e.g. `BTC/USDT`), oldest first, at most `limit`.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>>;
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, report: &MarketReport) -> Result<()>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn fetch(&self) -> Result<Vec<CandleSeries>>;
    async fn analyze(&self, data: Vec<CandleSeries>) -> Result<MarketReport>;
    /// The completion prompt `analyze` would send, for dry runs.
    fn preview(&self, data: &[CandleSeries]) -> Result<String>;
    /// Delivers the report and returns where the run was recorded.
    async fn publish(&self, report: MarketReport) -> Result<String>;
}
