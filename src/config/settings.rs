use crate::adapters::{bybit, kraken, openai, ExchangeCredentials};
use crate::domain::model::Timeframe;
use crate::utils::error::{Result, TrandError};
use crate::utils::retry::RetryPolicy;
use crate::utils::validation::{self, Validate};
use chrono::NaiveTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TIMEFRAMES: [&str; 4] = ["1d", "4h", "1h", "15m"];
/// Asia, Europe and US opens (UTC).
pub const DEFAULT_NOTIFICATION_TIMES: [&str; 3] = ["09:00", "17:00", "01:00"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Bybit,
    Kraken,
}

impl ExchangeKind {
    pub fn other(&self) -> Self {
        match self {
            Self::Bybit => Self::Kraken,
            Self::Kraken => Self::Bybit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub market: MarketSettings,
    pub completion: CompletionSettings,
    pub notification: NotificationSettings,
    pub retry: RetrySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    pub symbol: String,
    pub timeframes: Vec<Timeframe>,
    pub primary_exchange: ExchangeKind,
    /// Retry a failed timeframe once on the other exchange.
    pub use_fallback: bool,
    pub bybit: ExchangeSettings,
    pub kraken: ExchangeSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub webhook_url: String,
    pub times: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub delay_seconds: u64,
    /// Discord 速率限制較嚴，webhook 重試間隔較長
    pub webhook_delay_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub dir: String,
    pub file: String,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            symbol: "BTC/USDT".to_string(),
            timeframes: vec![Timeframe::D1, Timeframe::H4, Timeframe::H1, Timeframe::M15],
            primary_exchange: ExchangeKind::Bybit,
            use_fallback: true,
            bybit: ExchangeSettings::with_base_url(bybit::DEFAULT_BASE_URL),
            kraken: ExchangeSettings::with_base_url(kraken::DEFAULT_BASE_URL),
        }
    }
}

impl MarketSettings {
    /// 只寫了金鑰的交易所區段沿用預設端點
    fn fill_default_base_urls(&mut self) {
        if self.bybit.base_url.trim().is_empty() {
            self.bybit.base_url = bybit::DEFAULT_BASE_URL.to_string();
        }
        if self.kraken.base_url.trim().is_empty() {
            self.kraken.base_url = kraken::DEFAULT_BASE_URL.to_string();
        }
    }
}

impl ExchangeSettings {
    fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: None,
            api_secret: None,
        }
    }

    pub fn credentials(&self) -> ExchangeCredentials {
        ExchangeCredentials::new(self.api_key.clone(), self.api_secret.clone())
    }
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self::with_base_url("")
    }
}

impl Default for CompletionSettings {
    fn default() -> Self {
        let options = openai::CompletionOptions::default();
        Self {
            api_key: String::new(),
            base_url: openai::DEFAULT_BASE_URL.to_string(),
            model: options.model,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }
}

impl CompletionSettings {
    pub fn options(&self) -> openai::CompletionOptions {
        openai::CompletionOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            times: DEFAULT_NOTIFICATION_TIMES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_seconds: 2,
            webhook_delay_seconds: 5,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_secs(self.delay_seconds))
    }

    pub fn webhook_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_secs(self.webhook_delay_seconds))
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            file: "trading_signals.log".to_string(),
        }
    }
}

/// Accepts a JSON array (`["1d","4h"]`) or a comma-separated list (`1d,4h`).
pub fn parse_list(field: &str, raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<String>>(trimmed).map_err(|e| {
            TrandError::InvalidConfigValueError {
                field: field.to_string(),
                value: raw.to_string(),
                reason: format!("Invalid JSON list: {}", e),
            }
        });
    }
    Ok(trimmed
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

impl Settings {
    /// 從 TOML 檔案載入設定
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(TrandError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析設定
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        let mut settings: Self =
            toml::from_str(&processed_content).map_err(|e| TrandError::InvalidConfigValueError {
                field: "config_file".to_string(),
                value: String::new(),
                reason: format!("TOML parsing error: {}", e),
            })?;
        settings.market.fill_default_base_urls();
        Ok(settings)
    }

    /// 替換環境變數 (例如 ${OPENAI_API_KEY})
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| TrandError::config(format!("env substitution pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Defaults, then the optional TOML file, then the process environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut settings = match config_path {
            Some(path) => {
                tracing::info!("📁 Loading configuration from: {}", path.display());
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// 環境變數覆蓋設定；空字串視為未設定
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DISCORD_WEBHOOK_URL") {
            self.notification.webhook_url = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.completion.api_key = v;
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.completion.model = v;
        }
        if let Some(v) = get("OPENAI_API_BASE") {
            self.completion.base_url = v;
        }
        if let Some(v) = get("TRADING_INTERVALS") {
            self.market.timeframes = parse_list("TRADING_INTERVALS", &v)?
                .iter()
                .map(|s| s.parse())
                .collect::<Result<Vec<Timeframe>>>()?;
        }
        if let Some(v) = get("NOTIFICATION_TIMES") {
            self.notification.times = parse_list("NOTIFICATION_TIMES", &v)?;
        }
        if let Some(v) = get("TRAND_SYMBOL") {
            self.market.symbol = v;
        }
        if let Some(v) = get("TRAND_LOG_DIR") {
            self.logging.dir = v;
        }
        if let Some(v) = get("BYBIT_API_BASE") {
            self.market.bybit.base_url = v;
        }
        if let Some(v) = get("KRAKEN_API_BASE") {
            self.market.kraken.base_url = v;
        }
        if let Some(v) = get("BYBIT_API_KEY") {
            self.market.bybit.api_key = Some(v);
        }
        if let Some(v) = get("BYBIT_API_SECRET") {
            self.market.bybit.api_secret = Some(v);
        }
        if let Some(v) = get("KRAKEN_API_KEY") {
            self.market.kraken.api_key = Some(v);
        }
        if let Some(v) = get("KRAKEN_API_SECRET") {
            self.market.kraken.api_secret = Some(v);
        }
        Ok(())
    }

    pub fn notification_times(&self) -> Result<Vec<NaiveTime>> {
        self.notification
            .times
            .iter()
            .map(|t| validation::parse_clock_time("NOTIFICATION_TIMES", t))
            .collect()
    }

    pub fn exchange(&self, kind: ExchangeKind) -> &ExchangeSettings {
        match kind {
            ExchangeKind::Bybit => &self.market.bybit,
            ExchangeKind::Kraken => &self.market.kraken,
        }
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validation::validate_url("DISCORD_WEBHOOK_URL", &self.notification.webhook_url)?;
        validation::validate_non_empty_string("OPENAI_API_KEY", &self.completion.api_key)?;
        validation::validate_url("completion.base_url", &self.completion.base_url)?;
        validation::validate_non_empty_string("completion.model", &self.completion.model)?;
        validation::validate_range("completion.temperature", self.completion.temperature, 0.0, 2.0)?;
        validation::validate_positive_number(
            "completion.max_tokens",
            self.completion.max_tokens as usize,
            1,
        )?;

        validation::validate_non_empty_string("market.symbol", &self.market.symbol)?;
        validation::validate_positive_number("TRADING_INTERVALS", self.market.timeframes.len(), 1)?;
        validation::validate_url("market.bybit.base_url", &self.market.bybit.base_url)?;
        validation::validate_url("market.kraken.base_url", &self.market.kraken.base_url)?;

        validation::validate_positive_number("NOTIFICATION_TIMES", self.notification.times.len(), 1)?;
        self.notification_times()?;

        validation::validate_positive_number("retry.attempts", self.retry.attempts as usize, 1)?;
        validation::validate_path("logging.dir", &self.logging.dir)?;
        validation::validate_path("logging.file", &self.logging.file)?;

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }
}
