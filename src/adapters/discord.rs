use crate::domain::model::{MarketReport, Verdict};
use crate::domain::ports::Notifier;
use crate::utils::error::{Result, TrandError};
use crate::utils::retry::{with_retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

const SERVICE: &str = "webhook";
const MAX_CONTENT_CHARS: usize = 2000;
const MAX_FIELD_CHARS: usize = 1024;
const MAX_EMBEDS: usize = 10;
const NO_INFORMATION: &str = "No information";

#[derive(Debug, Serialize, PartialEq)]
pub struct WebhookMessage {
    pub content: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Embed {
    pub title: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn field(name: &str, value: &str, inline: bool) -> EmbedField {
    let value = if value.trim().is_empty() {
        NO_INFORMATION
    } else {
        value
    };
    EmbedField {
        name: name.to_string(),
        value: truncate(value, MAX_FIELD_CHARS),
        inline,
    }
}

fn verdict_embed(verdict: &Verdict, timestamp: &str) -> Embed {
    Embed {
        title: format!("{} analysis", verdict.timeframe),
        color: verdict.judgment.color(),
        fields: vec![
            field("Judgment", verdict.judgment.label(), true),
            field("Outlook", &verdict.outlook, false),
            field("Reasoning", &verdict.reasoning, false),
            field("Advice", &verdict.advice, false),
        ],
        footer: EmbedFooter {
            text: format!("TRAND Bot • {} analysis", verdict.timeframe),
        },
        timestamp: timestamp.to_string(),
    }
}

pub fn format_report(report: &MarketReport) -> WebhookMessage {
    let content = format!(
        "📊 **{} {} Session Report** ({})",
        report.symbol,
        report.session.display_name(),
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let timestamp = report.generated_at.to_rfc3339();

    WebhookMessage {
        content: truncate(&content, MAX_CONTENT_CHARS),
        embeds: report
            .verdicts
            .iter()
            .take(MAX_EMBEDS)
            .map(|v| verdict_embed(v, &timestamp))
            .collect(),
    }
}

pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
    retry: RetryPolicy,
}

impl DiscordNotifier {
    pub fn new(client: Client, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
            retry: RetryPolicy::new(3, Duration::from_secs(5)),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn post(&self, message: &WebhookMessage) -> Result<()> {
        let response = self.client.post(&self.webhook_url).json(message).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Err(TrandError::AuthenticationError {
                    service: SERVICE.to_string(),
                    status: status.as_u16(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => Err(TrandError::RateLimitError {
                service: SERVICE.to_string(),
            }),
            _ => Err(TrandError::ApiStatusError {
                service: SERVICE.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn publish(&self, report: &MarketReport) -> Result<()> {
        let message = format_report(report);
        if message.embeds.is_empty() {
            return Err(TrandError::InvalidResponseError {
                service: SERVICE.to_string(),
                message: "report has no verdicts to send".to_string(),
            });
        }

        tracing::info!(
            "📨 Sending {} session report with {} timeframes",
            report.session.display_name(),
            message.embeds.len()
        );
        with_retry(self.retry, "Webhook post", || self.post(&message)).await?;
        tracing::info!("✅ Webhook notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Judgment, Session, Timeframe};
    use chrono::{TimeZone, Utc};
    use httpmock::prelude::*;

    fn report() -> MarketReport {
        MarketReport {
            symbol: "BTC/USDT".to_string(),
            session: Session::Asia,
            generated_at: Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap(),
            verdicts: vec![
                Verdict {
                    timeframe: Timeframe::D1,
                    judgment: Judgment::StrongBuy,
                    outlook: "Trend intact".to_string(),
                    reasoning: "EMA9 above EMA55".to_string(),
                    advice: "x".repeat(1500),
                },
                Verdict::unknown(Timeframe::H4),
            ],
            raw_response: String::new(),
        }
    }

    #[test]
    fn test_format_report() {
        let message = format_report(&report());

        assert_eq!(
            message.content,
            "📊 **BTC/USDT Asia Session Report** (2024-05-01 01:00:00 UTC)"
        );
        assert_eq!(message.embeds.len(), 2);

        let first = &message.embeds[0];
        assert_eq!(first.title, "1d analysis");
        assert_eq!(first.color, 0x00FF00);
        assert_eq!(first.fields[0].value, "Strong Buy");
        assert!(first.fields[0].inline);
        assert_eq!(first.fields[3].value.chars().count(), MAX_FIELD_CHARS);
        assert_eq!(first.footer.text, "TRAND Bot • 1d analysis");
        assert_eq!(first.timestamp, "2024-05-01T01:00:00+00:00");

        let second = &message.embeds[1];
        assert_eq!(second.color, 0x808080);
        assert_eq!(second.fields[1].value, NO_INFORMATION);
    }

    #[tokio::test]
    async fn test_publish_posts_once_on_success() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/webhooks/1/token")
                .body_contains("BTC/USDT Asia Session Report");
            then.status(204);
        });

        let notifier = DiscordNotifier::new(Client::new(), server.url("/api/webhooks/1/token"))
            .with_retry(RetryPolicy::new(3, Duration::ZERO));
        notifier.publish(&report()).await.unwrap();

        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_unknown_webhook_is_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/webhooks/1/token");
            then.status(404).json_body(serde_json::json!({"message": "Unknown Webhook", "code": 10015}));
        });

        let notifier = DiscordNotifier::new(Client::new(), server.url("/api/webhooks/1/token"))
            .with_retry(RetryPolicy::new(3, Duration::ZERO));
        let err = notifier.publish(&report()).await.unwrap_err();

        mock.assert_hits(1);
        assert!(matches!(err, TrandError::AuthenticationError { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_empty_report_is_rejected_without_posting() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST);
            then.status(204);
        });

        let mut empty = report();
        empty.verdicts.clear();
        let notifier = DiscordNotifier::new(Client::new(), server.url("/hook"));

        assert!(notifier.publish(&empty).await.is_err());
        mock.assert_hits(0);
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        assert_eq!(truncate("ééé", 3), "ééé");
        assert_eq!(truncate("éééé", 3), "éé…");
    }
}
