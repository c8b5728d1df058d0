//! Technical indicators computed over one timeframe's candle series.
//!
//! Every series function returns a vector aligned with its input; `None` marks
//! positions where the indicator is not yet defined (warm-up window).

use crate::domain::model::{Candle, CandleSeries, Timeframe};
use serde::Serialize;
use std::fmt;

const SMA_PERIODS: [usize; 3] = [20, 50, 200];
const EMA_PERIODS: [usize; 4] = [9, 21, 55, 200];
const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const BBANDS_PERIOD: usize = 20;
const BBANDS_STD: f64 = 2.0;
const SUMMARY_WINDOW: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Neutral,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Neutral => "NEUTRAL",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    StrongUptrend,
    PossibleRebound,
    PossibleCorrection,
    Downtrend,
    Undetermined,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StrongUptrend => "strong uptrend",
            Self::PossibleRebound => "possible rebound",
            Self::PossibleCorrection => "possible correction",
            Self::Downtrend => "downtrend",
            Self::Undetermined => "not enough data to determine trend",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSummary {
    pub current_price: f64,
    pub price_change: Option<f64>,
    pub price_change_pct: Option<f64>,
    pub high_24: f64,
    pub low_24: f64,
    pub volume_24: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicalSnapshot {
    pub timeframe: Timeframe,
    pub source: String,
    /// Latest value of each defined indicator, in display order.
    pub indicators: Vec<(String, f64)>,
    /// Per-indicator signals followed by `overall`.
    pub signals: Vec<(String, Signal)>,
    pub summary: MarketSummary,
}

impl TechnicalSnapshot {
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn signal(&self, name: &str) -> Option<Signal> {
        self.signals.iter().find(|(n, _)| n == name).map(|(_, s)| *s)
    }
}

pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= period {
            sum -= values[i - period];
        }
        out.push((i + 1 >= period).then(|| sum / period as f64));
    }
    out
}

/// Exponential moving average, `alpha = 2 / (period + 1)`, seeded with the first value.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    for (i, v) in values.iter().enumerate() {
        let next = if i == 0 {
            *v
        } else {
            alpha * v + (1.0 - alpha) * out[i - 1]
        };
        out.push(next);
    }
    out
}

/// Sample (n-1) rolling standard deviation.
pub fn rolling_std(values: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if period < 2 || i + 1 < period {
                return None;
            }
            let window = &values[i + 1 - period..=i];
            let mean = window.iter().sum::<f64>() / period as f64;
            let var = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (period - 1) as f64;
            Some(var.sqrt())
        })
        .collect()
}

/// RSI from simple rolling means of gains and losses.
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }
    let deltas: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    for i in period..values.len() {
        // deltas[i-1] 對應 values[i]
        let window = &deltas[i - period..i];
        let gain = window.iter().map(|d| d.max(0.0)).sum::<f64>() / period as f64;
        let loss = window.iter().map(|d| (-d).max(0.0)).sum::<f64>() / period as f64;
        out[i] = if loss == 0.0 {
            (gain > 0.0).then_some(100.0)
        } else {
            Some(100.0 - 100.0 / (1.0 + gain / loss))
        };
    }
    out
}

pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal = ema(&line, signal);
    let histogram = line.iter().zip(&signal).map(|(l, s)| l - s).collect();
    Macd {
        line,
        signal,
        histogram,
    }
}

fn crossover(fast: &[f64], slow: &[f64]) -> Signal {
    let n = fast.len().min(slow.len());
    if n < 2 {
        return Signal::Neutral;
    }
    let (f0, f1) = (fast[n - 2], fast[n - 1]);
    let (s0, s1) = (slow[n - 2], slow[n - 1]);
    if f1 > s1 && f0 <= s0 {
        Signal::Buy
    } else if f1 < s1 && f0 >= s0 {
        Signal::Sell
    } else {
        Signal::Neutral
    }
}

fn last_defined(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten().filter(|v| v.is_finite())
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn summarize(candles: &[Candle], closes: &[f64]) -> Option<MarketSummary> {
    let current_price = *closes.last()?;
    let previous = closes.len().checked_sub(2).map(|i| closes[i]);
    let price_change = previous.map(|p| current_price - p);
    let price_change_pct = previous
        .filter(|p| *p != 0.0)
        .map(|p| (current_price - p) / p * 100.0);

    let recent = &candles[candles.len().saturating_sub(SUMMARY_WINDOW)..];
    let high_24 = recent.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low_24 = recent.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let volume_24 = recent.iter().map(|c| c.volume).sum();

    let sma20 = last_defined(&sma(closes, 20));
    let sma50 = last_defined(&sma(closes, 50));
    let trend = match (sma20, sma50) {
        (Some(s20), Some(s50)) => {
            if current_price > s20 && s20 > s50 {
                Trend::StrongUptrend
            } else if current_price > s20 && s20 < s50 {
                Trend::PossibleRebound
            } else if current_price < s20 && s20 > s50 {
                Trend::PossibleCorrection
            } else {
                Trend::Downtrend
            }
        }
        _ => Trend::Undetermined,
    };

    Some(MarketSummary {
        current_price,
        price_change,
        price_change_pct,
        high_24,
        low_24,
        volume_24,
        trend,
    })
}

/// Indicators, signals and summary for one series. `None` for an empty series.
pub fn analyze_series(series: &CandleSeries) -> Option<TechnicalSnapshot> {
    let closes: Vec<f64> = series.candles.iter().map(|c| c.close).collect();
    let summary = summarize(&series.candles, &closes)?;

    let mut indicators = Vec::new();
    for period in SMA_PERIODS {
        if let Some(v) = last_defined(&sma(&closes, period)) {
            indicators.push((format!("sma_{}", period), round2(v)));
        }
    }
    let emas: Vec<(usize, Vec<f64>)> = EMA_PERIODS.iter().map(|&p| (p, ema(&closes, p))).collect();
    for (period, values) in &emas {
        if let Some(v) = values.last() {
            indicators.push((format!("ema_{}", period), round2(*v)));
        }
    }
    let rsi_values = rsi(&closes, RSI_PERIOD);
    let rsi_last = last_defined(&rsi_values);
    if let Some(v) = rsi_last {
        indicators.push(("rsi".to_string(), round2(v)));
    }
    let macd = macd(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    if let (Some(l), Some(s), Some(h)) = (macd.line.last(), macd.signal.last(), macd.histogram.last()) {
        indicators.push(("macd".to_string(), round2(*l)));
        indicators.push(("macd_signal".to_string(), round2(*s)));
        indicators.push(("macd_hist".to_string(), round2(*h)));
    }
    let middle = last_defined(&sma(&closes, BBANDS_PERIOD));
    let std_dev = last_defined(&rolling_std(&closes, BBANDS_PERIOD));
    let bands = middle
        .zip(std_dev)
        .map(|(m, sd)| (m + sd * BBANDS_STD, m, m - sd * BBANDS_STD));
    if let Some((upper, mid, lower)) = bands {
        indicators.push(("bb_upper".to_string(), round2(upper)));
        indicators.push(("bb_middle".to_string(), round2(mid)));
        indicators.push(("bb_lower".to_string(), round2(lower)));
    }

    let mut signals = Vec::new();
    let ema_fast = emas.iter().find(|(p, _)| *p == 9).map(|(_, v)| v);
    let ema_slow = emas.iter().find(|(p, _)| *p == 55).map(|(_, v)| v);
    if let (Some(fast), Some(slow)) = (ema_fast, ema_slow) {
        signals.push(("ema_cross".to_string(), crossover(fast, slow)));
    }
    if let Some(v) = rsi_last {
        let signal = if v < 30.0 {
            Signal::Buy
        } else if v > 70.0 {
            Signal::Sell
        } else {
            Signal::Neutral
        };
        signals.push(("rsi".to_string(), signal));
    }
    signals.push(("macd".to_string(), crossover(&macd.line, &macd.signal)));
    if let Some((upper, _, lower)) = bands {
        let signal = if summary.current_price < lower {
            Signal::Buy
        } else if summary.current_price > upper {
            Signal::Sell
        } else {
            Signal::Neutral
        };
        signals.push(("bbands".to_string(), signal));
    }

    let buys = signals.iter().filter(|(_, s)| *s == Signal::Buy).count();
    let sells = signals.iter().filter(|(_, s)| *s == Signal::Sell).count();
    let overall = match buys.cmp(&sells) {
        std::cmp::Ordering::Greater => Signal::Buy,
        std::cmp::Ordering::Less => Signal::Sell,
        std::cmp::Ordering::Equal => Signal::Neutral,
    };
    signals.push(("overall".to_string(), overall));

    Some(TechnicalSnapshot {
        timeframe: series.timeframe,
        source: series.source.clone(),
        indicators,
        signals,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                open_time: start + Duration::hours(i as i64),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 10.0,
            })
            .collect()
    }

    fn series(closes: &[f64]) -> CandleSeries {
        CandleSeries {
            timeframe: Timeframe::H1,
            source: "test".to_string(),
            candles: candles_from_closes(closes),
        }
    }

    #[test]
    fn test_sma_warm_up_and_values() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out, vec![None, None, Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_ema_is_seeded_with_first_value() {
        let out = ema(&[10.0, 20.0], 3);
        assert_eq!(out[0], 10.0);
        // alpha = 0.5
        assert!((out[1] - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_rolling_std_uses_sample_deviation() {
        let out = rolling_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
        let sd = out[7].unwrap();
        assert!((sd - 2.138089935).abs() < 1e-6);
        assert!(out[6].is_none());
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(rsi(&rising, 14)[19], Some(100.0));
        assert!(rsi(&rising, 14)[13].is_none());

        let falling: Vec<f64> = (1..=20).rev().map(f64::from).collect();
        assert_eq!(rsi(&falling, 14)[19], Some(0.0));

        let flat = vec![5.0; 20];
        assert!(rsi(&flat, 14)[19].is_none());
    }

    #[test]
    fn test_crossover_detection() {
        assert_eq!(crossover(&[1.0, 3.0], &[2.0, 2.0]), Signal::Buy);
        assert_eq!(crossover(&[3.0, 1.0], &[2.0, 2.0]), Signal::Sell);
        assert_eq!(crossover(&[3.0, 3.0], &[2.0, 2.0]), Signal::Neutral);
        assert_eq!(crossover(&[3.0], &[2.0]), Signal::Neutral);
    }

    #[test]
    fn test_analyze_short_series_omits_long_indicators() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let snapshot = analyze_series(&series(&closes)).unwrap();

        assert!(snapshot.indicator("sma_20").is_some());
        assert!(snapshot.indicator("sma_50").is_none());
        assert!(snapshot.indicator("sma_200").is_none());
        assert!(snapshot.indicator("ema_200").is_some());
        assert!(snapshot.indicator("bb_upper").is_some());
        assert_eq!(snapshot.summary.trend, Trend::Undetermined);
        assert_eq!(snapshot.signal("rsi"), Some(Signal::Sell));
        assert!(snapshot.signal("overall").is_some());
    }

    #[test]
    fn test_summary_on_steady_uptrend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let snapshot = analyze_series(&series(&closes)).unwrap();
        let summary = &snapshot.summary;

        assert_eq!(summary.current_price, 159.0);
        assert_eq!(summary.price_change, Some(1.0));
        assert_eq!(summary.trend, Trend::StrongUptrend);
        // 最近 24 根 K 線
        assert_eq!(summary.high_24, 160.0);
        assert_eq!(summary.low_24, 135.0);
        assert_eq!(summary.volume_24, 240.0);
    }

    #[test]
    fn test_close_below_lower_band_is_buy() {
        let mut closes = vec![100.0; 25];
        closes[23] = 101.0;
        closes.push(80.0);
        let snapshot = analyze_series(&series(&closes)).unwrap();
        assert_eq!(snapshot.signal("bbands"), Some(Signal::Buy));
    }

    #[test]
    fn test_single_candle_has_no_change() {
        let snapshot = analyze_series(&series(&[100.0])).unwrap();
        assert_eq!(snapshot.summary.price_change, None);
        assert_eq!(snapshot.summary.price_change_pct, None);
    }

    #[test]
    fn test_empty_series_yields_nothing() {
        assert!(analyze_series(&series(&[])).is_none());
    }
}
