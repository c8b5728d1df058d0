//! Wires `Settings` into concrete adapters and a ready-to-run pipeline.

use crate::adapters::{BybitClient, DiscordNotifier, KrakenClient, LocalStorage, OpenAiClient};
use crate::config::{ExchangeKind, Settings};
use crate::core::pipeline::ReportPipeline;
use crate::domain::ports::MarketDataSource;
use reqwest::Client;

pub fn market_source(
    kind: ExchangeKind,
    settings: &Settings,
    client: &Client,
) -> Box<dyn MarketDataSource> {
    let exchange = settings.exchange(kind);
    let retry = settings.retry.policy();
    let (source, has_credentials): (Box<dyn MarketDataSource>, bool) = match kind {
        ExchangeKind::Bybit => {
            let c = BybitClient::new(client.clone(), &exchange.base_url, exchange.credentials())
                .with_retry(retry);
            let has = c.has_credentials();
            (Box::new(c), has)
        }
        ExchangeKind::Kraken => {
            let c = KrakenClient::new(client.clone(), &exchange.base_url, exchange.credentials())
                .with_retry(retry);
            let has = c.has_credentials();
            (Box::new(c), has)
        }
    };
    // 公開行情端點不需要金鑰
    if has_credentials {
        tracing::debug!("🔑 {} credentials configured, public endpoints only", source.name());
    }
    source
}

pub fn build_pipeline(settings: &Settings, client: &Client) -> ReportPipeline<LocalStorage> {
    let market = &settings.market;

    let completion = OpenAiClient::new(
        client.clone(),
        &settings.completion.base_url,
        &settings.completion.api_key,
        settings.completion.options(),
    )
    .with_retry(settings.retry.policy());
    let notifier = DiscordNotifier::new(client.clone(), &settings.notification.webhook_url)
        .with_retry(settings.retry.webhook_policy());

    let pipeline = ReportPipeline::new(
        market_source(market.primary_exchange, settings, client),
        Box::new(completion),
        Box::new(notifier),
        LocalStorage::new(&settings.logging.dir),
        &market.symbol,
        market.timeframes.clone(),
    )
    .with_log_file(&settings.logging.file);

    tracing::info!(
        "⚙️ {} on {:?}, timeframes {}",
        market.symbol,
        market.primary_exchange,
        market.timeframes.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
    );
    if market.use_fallback {
        pipeline.with_fallback(market_source(market.primary_exchange.other(), settings, client))
    } else {
        pipeline
    }
}
