use crate::utils::error::{Result, TrandError};
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H12,
    D1,
    W1,
    Mo1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::H12 => "12h",
            Self::D1 => "1d",
            Self::W1 => "1w",
            Self::Mo1 => "1M",
        }
    }

    /// Bybit v5 kline interval code.
    pub fn bybit_interval(&self) -> &'static str {
        match self {
            Self::M1 => "1",
            Self::M3 => "3",
            Self::M5 => "5",
            Self::M15 => "15",
            Self::M30 => "30",
            Self::H1 => "60",
            Self::H2 => "120",
            Self::H4 => "240",
            Self::H6 => "360",
            Self::H12 => "720",
            Self::D1 => "D",
            Self::W1 => "W",
            Self::Mo1 => "M",
        }
    }

    /// Kraken OHLC interval in minutes, if Kraken offers it.
    pub fn kraken_interval(&self) -> Option<u32> {
        match self {
            Self::M1 => Some(1),
            Self::M5 => Some(5),
            Self::M15 => Some(15),
            Self::M30 => Some(30),
            Self::H1 => Some(60),
            Self::H4 => Some(240),
            Self::D1 => Some(1440),
            Self::W1 => Some(10080),
            _ => None,
        }
    }

    /// Number of candles requested per fetch.
    pub fn candle_limit(&self) -> usize {
        match self {
            Self::D1 => 200,
            _ => 500,
        }
    }
}

impl FromStr for Timeframe {
    type Err = TrandError;

    fn from_str(s: &str) -> Result<Self> {
        // "1M" (月) 與 "1m" (分) 需區分大小寫
        let tf = match s.trim() {
            "1m" => Self::M1,
            "3m" => Self::M3,
            "5m" => Self::M5,
            "15m" => Self::M15,
            "30m" => Self::M30,
            "1h" | "1H" => Self::H1,
            "2h" | "2H" => Self::H2,
            "4h" | "4H" => Self::H4,
            "6h" | "6H" => Self::H6,
            "12h" | "12H" => Self::H12,
            "1d" | "1D" => Self::D1,
            "1w" | "1W" => Self::W1,
            "1M" => Self::Mo1,
            other => {
                return Err(TrandError::InvalidConfigValueError {
                    field: "TRADING_INTERVALS".to_string(),
                    value: other.to_string(),
                    reason: "Unknown timeframe. Use one of 1m 3m 5m 15m 30m 1h 2h 4h 6h 12h 1d 1w 1M"
                        .to_string(),
                })
            }
        };
        Ok(tf)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TrandError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One OHLCV record. Series are kept oldest-first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    pub timeframe: Timeframe,
    pub source: String,
    pub candles: Vec<Candle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Judgment {
    StrongBuy,
    WeakBuy,
    Neutral,
    WeakSell,
    StrongSell,
    Unknown,
}

impl Judgment {
    /// Lenient parse of the model's wording ("Strong Buy", "**weak sell**", "hold").
    pub fn parse(text: &str) -> Self {
        let normalized = text
            .trim()
            .trim_matches(|c: char| c == '*' || c == '[' || c == ']' || c == '`')
            .trim()
            .to_lowercase();

        // 開頭的標準標籤優先，後面的補充說明不影響判斷
        const LABELS: [(&str, Judgment); 8] = [
            ("strong buy", Judgment::StrongBuy),
            ("strong sell", Judgment::StrongSell),
            ("weak buy", Judgment::WeakBuy),
            ("weak sell", Judgment::WeakSell),
            ("neutral", Judgment::Neutral),
            ("hold", Judgment::Neutral),
            ("buy", Judgment::WeakBuy),
            ("sell", Judgment::WeakSell),
        ];
        if let Some((_, judgment)) = LABELS.iter().find(|(label, _)| normalized.starts_with(*label)) {
            return *judgment;
        }

        // 否則取最先出現的關鍵字
        const KEYWORDS: [(&str, Judgment); 6] = [
            ("buy", Judgment::WeakBuy),
            ("bullish", Judgment::WeakBuy),
            ("sell", Judgment::WeakSell),
            ("bearish", Judgment::WeakSell),
            ("neutral", Judgment::Neutral),
            ("hold", Judgment::Neutral),
        ];
        let Some((pos, judgment)) = KEYWORDS
            .iter()
            .filter_map(|(kw, j)| normalized.find(*kw).map(|pos| (pos, *j)))
            .min_by_key(|(pos, _)| *pos)
        else {
            return Self::Unknown;
        };
        let strong = normalized[..pos].trim_end().ends_with("strong");
        match (judgment, strong) {
            (Self::WeakBuy, true) => Self::StrongBuy,
            (Self::WeakSell, true) => Self::StrongSell,
            (j, _) => j,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::StrongBuy => "Strong Buy",
            Self::WeakBuy => "Weak Buy",
            Self::Neutral => "Neutral",
            Self::WeakSell => "Weak Sell",
            Self::StrongSell => "Strong Sell",
            Self::Unknown => "Unknown",
        }
    }

    /// Embed colour as 0xRRGGBB.
    pub fn color(&self) -> u32 {
        match self {
            Self::StrongBuy => 0x00FF00,
            Self::WeakBuy => 0x66CC66,
            Self::Neutral => 0xFFFF00,
            Self::WeakSell => 0xFF6666,
            Self::StrongSell => 0xFF0000,
            Self::Unknown => 0x808080,
        }
    }
}

impl fmt::Display for Judgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub timeframe: Timeframe,
    pub judgment: Judgment,
    pub outlook: String,
    pub reasoning: String,
    pub advice: String,
}

impl Verdict {
    pub fn unknown(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            judgment: Judgment::Unknown,
            outlook: String::new(),
            reasoning: String::new(),
            advice: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Session {
    Asia,
    Europe,
    Us,
}

impl Session {
    /// Asia [00,08), Europe [08,16), US [16,24) UTC.
    pub fn at(time: DateTime<Utc>) -> Self {
        match time.hour() {
            0..=7 => Self::Asia,
            8..=15 => Self::Europe,
            _ => Self::Us,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Asia => "Asia",
            Self::Europe => "Europe",
            Self::Us => "US",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketReport {
    pub symbol: String,
    pub session: Session,
    pub generated_at: DateTime<Utc>,
    pub verdicts: Vec<Verdict>,
    pub raw_response: String,
}

/// One line of the append-only run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub session: Session,
    pub symbol: String,
    pub timeframes: Vec<Timeframe>,
    pub judgments: BTreeMap<String, Judgment>,
    pub response: String,
}

impl From<&MarketReport> for RunLogEntry {
    fn from(report: &MarketReport) -> Self {
        Self {
            timestamp: report.generated_at,
            session: report.session,
            symbol: report.symbol.clone(),
            timeframes: report.verdicts.iter().map(|v| v.timeframe).collect(),
            judgments: report
                .verdicts
                .iter()
                .map(|v| (v.timeframe.to_string(), v.judgment))
                .collect(),
            response: report.raw_response.clone(),
        }
    }
}
