use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct ReportEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> ReportEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    /// One full report: fetch, analyse, post, record. Returns the run log file.
    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting report run");
        self.monitor.log_stats("start");

        tracing::info!("📥 Fetching market data...");
        let data = self.pipeline.fetch().await?;
        tracing::info!("Fetched {} timeframes", data.len());
        self.monitor.log_stats("fetch");

        tracing::info!("🧮 Analysing...");
        let report = self.pipeline.analyze(data).await?;
        tracing::info!(
            "Analysed {} timeframes for the {} session",
            report.verdicts.len(),
            report.session.display_name()
        );
        self.monitor.log_stats("analyze");

        tracing::info!("📤 Publishing...");
        let recorded = self.pipeline.publish(report).await?;
        tracing::info!("📝 Run recorded in: {}", recorded);
        self.monitor.log_final_stats();

        Ok(recorded)
    }

    /// Fetches data and renders the prompt without calling the completion API.
    pub async fn preview(&self) -> Result<String> {
        let data = self.pipeline.fetch().await?;
        self.pipeline.preview(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{CandleSeries, MarketReport, Session, Timeframe};
    use crate::utils::error::TrandError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    struct RecordingPipeline {
        steps: Mutex<Vec<&'static str>>,
        fail_analyze: bool,
    }

    impl RecordingPipeline {
        fn new(fail_analyze: bool) -> Self {
            Self {
                steps: Mutex::new(Vec::new()),
                fail_analyze,
            }
        }
    }

    #[async_trait]
    impl Pipeline for RecordingPipeline {
        async fn fetch(&self) -> Result<Vec<CandleSeries>> {
            self.steps.lock().unwrap().push("fetch");
            Ok(vec![CandleSeries {
                timeframe: Timeframe::H1,
                source: "test".to_string(),
                candles: vec![],
            }])
        }

        async fn analyze(&self, _data: Vec<CandleSeries>) -> Result<MarketReport> {
            self.steps.lock().unwrap().push("analyze");
            if self.fail_analyze {
                return Err(TrandError::RateLimitError {
                    service: "openai".to_string(),
                });
            }
            Ok(MarketReport {
                symbol: "BTC/USDT".to_string(),
                session: Session::Us,
                generated_at: Utc::now(),
                verdicts: vec![],
                raw_response: String::new(),
            })
        }

        fn preview(&self, data: &[CandleSeries]) -> Result<String> {
            self.steps.lock().unwrap().push("preview");
            Ok(format!("{} series", data.len()))
        }

        async fn publish(&self, _report: MarketReport) -> Result<String> {
            self.steps.lock().unwrap().push("publish");
            Ok("trading_signals.log".to_string())
        }
    }

    #[tokio::test]
    async fn test_run_executes_steps_in_order() {
        let engine = ReportEngine::new(RecordingPipeline::new(false));
        assert_eq!(engine.run().await.unwrap(), "trading_signals.log");
        assert_eq!(*engine.pipeline.steps.lock().unwrap(), vec!["fetch", "analyze", "publish"]);
    }

    #[tokio::test]
    async fn test_run_stops_before_publish_on_failure() {
        let engine = ReportEngine::new_with_monitoring(RecordingPipeline::new(true), true);
        assert!(engine.run().await.is_err());
        assert_eq!(*engine.pipeline.steps.lock().unwrap(), vec!["fetch", "analyze"]);
    }

    #[tokio::test]
    async fn test_preview_skips_analysis() {
        let engine = ReportEngine::new(RecordingPipeline::new(false));
        assert_eq!(engine.preview().await.unwrap(), "1 series");
        assert_eq!(*engine.pipeline.steps.lock().unwrap(), vec!["fetch", "preview"]);
    }
}
