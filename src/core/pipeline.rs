use crate::core::indicators::{self, TechnicalSnapshot};
use crate::core::prompt;
use crate::domain::model::{CandleSeries, MarketReport, RunLogEntry, Session, Timeframe};
use crate::domain::ports::{CompletionProvider, MarketDataSource, Notifier, Pipeline, Storage};
use crate::utils::error::{Result, TrandError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub struct ReportPipeline<S: Storage> {
    primary: Box<dyn MarketDataSource>,
    fallback: Option<Box<dyn MarketDataSource>>,
    completion: Box<dyn CompletionProvider>,
    notifier: Box<dyn Notifier>,
    storage: S,
    symbol: String,
    timeframes: Vec<Timeframe>,
    log_file: String,
    clock: fn() -> DateTime<Utc>,
}

impl<S: Storage> ReportPipeline<S> {
    pub fn new(
        primary: Box<dyn MarketDataSource>,
        completion: Box<dyn CompletionProvider>,
        notifier: Box<dyn Notifier>,
        storage: S,
        symbol: impl Into<String>,
        timeframes: Vec<Timeframe>,
    ) -> Self {
        Self {
            primary,
            fallback: None,
            completion,
            notifier,
            storage,
            symbol: symbol.into(),
            timeframes,
            log_file: "trading_signals.log".to_string(),
            clock: Utc::now,
        }
    }

    pub fn with_fallback(mut self, fallback: Box<dyn MarketDataSource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_log_file(mut self, log_file: impl Into<String>) -> Self {
        self.log_file = log_file.into();
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    async fn fetch_timeframe(&self, timeframe: Timeframe) -> Result<CandleSeries> {
        let limit = timeframe.candle_limit();
        let primary_err = match self.fetch_from(self.primary.as_ref(), timeframe, limit).await {
            Ok(series) => return Ok(series),
            Err(e) => e,
        };

        let Some(fallback) = self.fallback.as_deref() else {
            return Err(primary_err);
        };
        tracing::warn!(
            "⚠️ {} {} failed: {}. Trying {}",
            self.primary.name(),
            timeframe,
            primary_err,
            fallback.name()
        );
        self.fetch_from(fallback, timeframe, limit).await
    }

    async fn fetch_from(
        &self,
        source: &dyn MarketDataSource,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries> {
        let candles = source.fetch_candles(&self.symbol, timeframe, limit).await?;
        if candles.is_empty() {
            return Err(TrandError::MarketDataUnavailable {
                message: format!("{} returned no {} candles", source.name(), timeframe),
            });
        }
        tracing::info!("📈 {} {}: {} candles from {}", self.symbol, timeframe, candles.len(), source.name());
        Ok(CandleSeries {
            timeframe,
            source: source.name().to_string(),
            candles,
        })
    }

    fn snapshots(&self, data: &[CandleSeries]) -> Result<Vec<TechnicalSnapshot>> {
        let snapshots: Vec<TechnicalSnapshot> =
            data.iter().filter_map(indicators::analyze_series).collect();
        if snapshots.is_empty() {
            return Err(TrandError::MarketDataUnavailable {
                message: "no timeframe has enough candles to analyse".to_string(),
            });
        }
        Ok(snapshots)
    }
}

#[async_trait]
impl<S: Storage> Pipeline for ReportPipeline<S> {
    async fn fetch(&self) -> Result<Vec<CandleSeries>> {
        let mut data = Vec::with_capacity(self.timeframes.len());
        let mut last_error = None;
        let mut all_transient = true;

        // 逐一抓取，單一週期失敗不中斷整體
        for &timeframe in &self.timeframes {
            match self.fetch_timeframe(timeframe).await {
                Ok(series) => data.push(series),
                Err(e) => {
                    tracing::error!("❌ Skipping {} {}: {}", self.symbol, timeframe, e);
                    all_transient &= e.is_retryable();
                    last_error = Some(e);
                }
            }
        }

        if !data.is_empty() {
            return Ok(data);
        }
        match last_error {
            // 全部是暫時性錯誤時保留原錯誤，維持其嚴重程度
            Some(e) if all_transient => Err(e),
            Some(e) => Err(TrandError::MarketDataUnavailable {
                message: format!("every timeframe failed, last error: {}", e),
            }),
            None => Err(TrandError::MarketDataUnavailable {
                message: "no timeframes configured".to_string(),
            }),
        }
    }

    async fn analyze(&self, data: Vec<CandleSeries>) -> Result<MarketReport> {
        let snapshots = self.snapshots(&data)?;
        let requested: Vec<Timeframe> = snapshots.iter().map(|s| s.timeframe).collect();
        let messages = prompt::build_messages(&self.symbol, &snapshots);

        let response = self.completion.complete(&messages).await?;
        let verdicts = prompt::parse_verdicts(&response, &requested);

        let generated_at = (self.clock)();
        Ok(MarketReport {
            symbol: self.symbol.clone(),
            session: Session::at(generated_at),
            generated_at,
            verdicts,
            raw_response: response,
        })
    }

    fn preview(&self, data: &[CandleSeries]) -> Result<String> {
        let snapshots = self.snapshots(data)?;
        Ok(prompt::build_user_prompt(&self.symbol, &snapshots))
    }

    async fn publish(&self, report: MarketReport) -> Result<String> {
        self.notifier.publish(&report).await?;

        let line = serde_json::to_string(&RunLogEntry::from(&report))?;
        self.storage
            .append_line(&self.log_file, &line)
            .await
            .map_err(|e| TrandError::RunLogError {
                message: format!("{}: {}", self.log_file, e),
            })?;
        Ok(self.log_file.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalStorage;
    use crate::domain::model::{Candle, ChatMessage, Judgment};
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn candles(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let close = 40_000.0 + i as f64 * 10.0;
                Candle {
                    open_time: start + Duration::hours(i as i64),
                    open: close - 5.0,
                    high: close + 20.0,
                    low: close - 20.0,
                    close,
                    volume: 12.5,
                }
            })
            .collect()
    }

    struct MockSource {
        name: &'static str,
        fail_on: Vec<Timeframe>,
        transient: bool,
        calls: Arc<Mutex<Vec<Timeframe>>>,
    }

    impl MockSource {
        fn new(name: &'static str, fail_on: Vec<Timeframe>) -> (Self, Arc<Mutex<Vec<Timeframe>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    name,
                    fail_on,
                    transient: false,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl MarketDataSource for MockSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_candles(&self, _symbol: &str, timeframe: Timeframe, _limit: usize) -> Result<Vec<Candle>> {
            self.calls.lock().unwrap().push(timeframe);
            if self.fail_on.contains(&timeframe) && self.transient {
                return Err(TrandError::RateLimitError {
                    service: self.name.to_string(),
                });
            }
            if self.fail_on.contains(&timeframe) {
                return Err(TrandError::ApiError {
                    service: self.name.to_string(),
                    message: "boom".to_string(),
                });
            }
            Ok(candles(60))
        }
    }

    struct MockCompletion {
        reply: Option<String>,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl CompletionProvider for MockCompletion {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(messages.len(), 2);
            self.reply.clone().ok_or(TrandError::AuthenticationError {
                service: "openai".to_string(),
                status: 401,
            })
        }
    }

    struct MockNotifier {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn publish(&self, _report: &MarketReport) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        pipeline: ReportPipeline<LocalStorage>,
        primary_calls: Arc<Mutex<Vec<Timeframe>>>,
        fallback_calls: Arc<Mutex<Vec<Timeframe>>>,
        completions: Arc<AtomicU32>,
        posts: Arc<AtomicU32>,
        _dir: TempDir,
        log_path: std::path::PathBuf,
    }

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn harness(reply: Option<&str>, primary_fails: Vec<Timeframe>, fallback_fails: Vec<Timeframe>) -> Harness {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().join("logs"));
        let log_path = storage.full_path("trading_signals.log");
        let (primary, primary_calls) = MockSource::new("bybit", primary_fails);
        let (fallback, fallback_calls) = MockSource::new("kraken", fallback_fails);
        let completions = Arc::new(AtomicU32::new(0));
        let posts = Arc::new(AtomicU32::new(0));

        let pipeline = ReportPipeline::new(
            Box::new(primary),
            Box::new(MockCompletion {
                reply: reply.map(str::to_string),
                calls: completions.clone(),
            }),
            Box::new(MockNotifier { calls: posts.clone() }),
            storage,
            "BTC/USDT",
            vec![Timeframe::D1, Timeframe::H4],
        )
        .with_fallback(Box::new(fallback))
        .with_clock(fixed_clock);

        Harness {
            pipeline,
            primary_calls,
            fallback_calls,
            completions,
            posts,
            _dir: dir,
            log_path,
        }
    }

    const REPLY: &str = "### 1d\nJudgment: Strong Buy\nOutlook: up\nReasoning: EMA\nAdvice: hold\n\n### 4h\nJudgment: Neutral\nOutlook: flat\nReasoning: RSI\nAdvice: wait";

    #[tokio::test]
    async fn test_fetch_calls_each_timeframe_once() {
        let h = harness(Some(REPLY), vec![], vec![]);
        let data = h.pipeline.fetch().await.unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(*h.primary_calls.lock().unwrap(), vec![Timeframe::D1, Timeframe::H4]);
        assert!(h.fallback_calls.lock().unwrap().is_empty());
        assert!(data.iter().all(|s| s.source == "bybit"));
    }

    #[tokio::test]
    async fn test_fetch_falls_back_per_timeframe() {
        let h = harness(Some(REPLY), vec![Timeframe::H4], vec![]);
        let data = h.pipeline.fetch().await.unwrap();

        assert_eq!(*h.fallback_calls.lock().unwrap(), vec![Timeframe::H4]);
        assert_eq!(data[1].source, "kraken");
    }

    #[tokio::test]
    async fn test_fetch_skips_timeframe_when_both_sources_fail() {
        let h = harness(Some(REPLY), vec![Timeframe::H4], vec![Timeframe::H4]);
        let data = h.pipeline.fetch().await.unwrap();

        assert_eq!(data.len(), 1);
        assert_eq!(data[0].timeframe, Timeframe::D1);
    }

    #[tokio::test]
    async fn test_fetch_fails_when_nothing_is_available() {
        let all = vec![Timeframe::D1, Timeframe::H4];
        let h = harness(Some(REPLY), all.clone(), all);
        assert!(matches!(
            h.pipeline.fetch().await,
            Err(TrandError::MarketDataUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_transient_failures_everywhere_keep_their_severity() {
        let all = vec![Timeframe::D1, Timeframe::H4];
        let (mut primary, _) = MockSource::new("bybit", all.clone());
        primary.transient = true;
        let (mut fallback, _) = MockSource::new("kraken", all);
        fallback.transient = true;
        let dir = TempDir::new().unwrap();

        let pipeline = ReportPipeline::new(
            Box::new(primary),
            Box::new(MockCompletion {
                reply: Some(REPLY.to_string()),
                calls: Arc::new(AtomicU32::new(0)),
            }),
            Box::new(MockNotifier {
                calls: Arc::new(AtomicU32::new(0)),
            }),
            LocalStorage::new(dir.path()),
            "BTC/USDT",
            vec![Timeframe::D1, Timeframe::H4],
        )
        .with_fallback(Box::new(fallback));

        let err = pipeline.fetch().await.unwrap_err();
        assert!(matches!(err, TrandError::RateLimitError { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_analyze_makes_one_completion_for_all_timeframes() {
        let h = harness(Some(REPLY), vec![], vec![]);
        let data = h.pipeline.fetch().await.unwrap();
        let report = h.pipeline.analyze(data).await.unwrap();

        assert_eq!(h.completions.load(Ordering::SeqCst), 1);
        assert_eq!(report.session, Session::Europe);
        assert_eq!(report.verdicts.len(), 2);
        assert_eq!(report.verdicts[0].judgment, Judgment::StrongBuy);
        assert_eq!(report.verdicts[1].judgment, Judgment::Neutral);
    }

    #[tokio::test]
    async fn test_publish_posts_then_appends_log_line() {
        let h = harness(Some(REPLY), vec![], vec![]);
        let data = h.pipeline.fetch().await.unwrap();
        let report = h.pipeline.analyze(data).await.unwrap();
        let recorded = h.pipeline.publish(report).await.unwrap();

        assert_eq!(recorded, "trading_signals.log");
        assert_eq!(h.posts.load(Ordering::SeqCst), 1);

        let content = std::fs::read_to_string(&h.log_path).unwrap();
        assert_eq!(content.lines().count(), 1);
        let entry: RunLogEntry = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(entry.symbol, "BTC/USDT");
        assert_eq!(entry.judgments["1d"], Judgment::StrongBuy);
    }

    #[tokio::test]
    async fn test_completion_failure_propagates() {
        let h = harness(None, vec![], vec![]);
        let data = h.pipeline.fetch().await.unwrap();

        assert!(h.pipeline.analyze(data).await.is_err());
        assert_eq!(h.posts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_preview_does_not_call_completion() {
        let h = harness(Some(REPLY), vec![], vec![]);
        let data = h.pipeline.fetch().await.unwrap();
        let prompt = h.pipeline.preview(&data).unwrap();

        assert!(prompt.contains("## 1d (source: bybit)"));
        assert_eq!(h.completions.load(Ordering::SeqCst), 0);
    }
}
