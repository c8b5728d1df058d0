use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrandError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("{service} rejected the credentials (HTTP {status})")]
    AuthenticationError { service: String, status: u16 },

    #[error("{service} rate limit exceeded")]
    RateLimitError { service: String },

    #[error("{service} returned HTTP {status}: {body}")]
    ApiStatusError {
        service: String,
        status: u16,
        body: String,
    },

    #[error("{service} returned an error: {message}")]
    ApiError { service: String, message: String },

    #[error("Invalid response from {service}: {message}")]
    InvalidResponseError { service: String, message: String },

    #[error("No market data available: {message}")]
    MarketDataUnavailable { message: String },

    #[error("Timeframe {timeframe} is not supported by {exchange}")]
    UnsupportedTimeframe { exchange: String, timeframe: String },

    #[error("Failed to write run log: {message}")]
    RunLogError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    ExternalService,
    Data,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl TrandError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::UnsupportedTimeframe { .. } => ErrorCategory::Configuration,
            Self::HttpError(_) => ErrorCategory::Network,
            Self::AuthenticationError { .. }
            | Self::RateLimitError { .. }
            | Self::ApiStatusError { .. }
            | Self::ApiError { .. }
            | Self::InvalidResponseError { .. } => ErrorCategory::ExternalService,
            Self::SerializationError(_) | Self::MarketDataUnavailable { .. } => ErrorCategory::Data,
            Self::IoError(_) | Self::RunLogError { .. } => ErrorCategory::Storage,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 通知已送出，只是紀錄失敗
            Self::RunLogError { .. } => ErrorSeverity::Low,
            Self::HttpError(_) | Self::RateLimitError { .. } => ErrorSeverity::Medium,
            Self::ApiStatusError { status, .. } if *status >= 500 => ErrorSeverity::Medium,
            Self::ApiStatusError { .. }
            | Self::ApiError { .. }
            | Self::InvalidResponseError { .. }
            | Self::MarketDataUnavailable { .. }
            | Self::SerializationError(_) => ErrorSeverity::High,
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::UnsupportedTimeframe { .. }
            | Self::AuthenticationError { .. }
            | Self::IoError(_) => ErrorSeverity::Critical,
        }
    }

    /// 暫時性錯誤：連線失敗、429、5xx
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::RateLimitError { .. } => true,
            Self::ApiStatusError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => {
                "Check the .env file, the environment variables and the --config file"
            }
            Self::UnsupportedTimeframe { .. } => {
                "Remove the timeframe from TRADING_INTERVALS or switch exchanges"
            }
            Self::AuthenticationError { .. } => "Verify the API key or webhook URL is still valid",
            Self::RateLimitError { .. } => "Wait a few minutes before the next run",
            Self::HttpError(_) | Self::ApiStatusError { .. } => {
                "Check network connectivity and the service status page, then retry"
            }
            Self::ApiError { .. } | Self::InvalidResponseError { .. } => {
                "Check the symbol, model name and API base URLs"
            }
            Self::MarketDataUnavailable { .. } => {
                "Check that the exchanges list the symbol for the configured timeframes"
            }
            Self::SerializationError(_) => "Report the unexpected payload shape",
            Self::IoError(_) | Self::RunLogError { .. } => {
                "Check that the log directory exists and is writable"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Network => format!("Network problem: {}", self),
            ErrorCategory::ExternalService => format!("External service problem: {}", self),
            ErrorCategory::Data => format!("Data problem: {}", self),
            ErrorCategory::Storage => format!("Storage problem: {}", self),
        }
    }

    /// 依嚴重程度決定程序結束碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, TrandError>;
