use crate::core::indicators::TechnicalSnapshot;
use crate::domain::model::{ChatMessage, Judgment, Timeframe, Verdict};
use std::collections::HashMap;
use std::fmt::Write;

const SYSTEM_PROMPT: &str =
    "You are a professional trader who analyses cryptocurrency markets. Answer concisely.";

pub fn build_messages(symbol: &str, snapshots: &[TechnicalSnapshot]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(build_user_prompt(symbol, snapshots)),
    ]
}

pub fn build_user_prompt(symbol: &str, snapshots: &[TechnicalSnapshot]) -> String {
    let timeframes: Vec<&str> = snapshots.iter().map(|s| s.timeframe.as_str()).collect();
    let mut prompt = format!(
        "You are a cryptocurrency trading advisor. Analyse the following {} market data on the {} timeframes and give a concise trading judgment for each timeframe.\n",
        symbol,
        timeframes.join(", ")
    );

    // String 寫入不會失敗
    for snapshot in snapshots {
        let s = &snapshot.summary;
        let _ = writeln!(prompt, "\n## {} (source: {})", snapshot.timeframe, snapshot.source);
        let _ = writeln!(prompt, "[Market data]");
        let _ = writeln!(prompt, "- Current price: {:.2}", s.current_price);
        match (s.price_change, s.price_change_pct) {
            (Some(change), Some(pct)) => {
                let _ = writeln!(prompt, "- Price change: {:.2} ({:.2}%)", change, pct);
            }
            _ => {
                let _ = writeln!(prompt, "- Price change: N/A");
            }
        }
        let _ = writeln!(
            prompt,
            "- Last 24 candles: high {:.2}, low {:.2}, volume {:.2}",
            s.high_24, s.low_24, s.volume_24
        );
        let _ = writeln!(prompt, "- Overall trend: {}", s.trend);

        let _ = writeln!(prompt, "[Technical indicators]");
        for (name, value) in &snapshot.indicators {
            let _ = writeln!(prompt, "- {}: {:.2}", name, value);
        }

        let _ = writeln!(prompt, "[Signals]");
        for (name, signal) in &snapshot.signals {
            let _ = writeln!(prompt, "- {}: {}", name, signal);
        }
    }

    prompt.push_str(
        "\nFor every timeframe above, give the current judgment (Strong Buy, Weak Buy, Neutral, Weak Sell, Strong Sell) and explain it in 3-4 short lines, mentioning the most important indicators and the short/mid-term outlook.\nAnswer strictly in this format, one block per timeframe:\n\n",
    );
    for tf in &timeframes {
        let _ = writeln!(
            prompt,
            "### {}\nJudgment: [Strong Buy/Weak Buy/Neutral/Weak Sell/Strong Sell]\nOutlook: [market view, under 100 characters]\nReasoning: [indicator-based rationale, under 100 characters]\nAdvice: [short advice to traders]\n",
            tf
        );
    }

    prompt
}

#[derive(Default)]
struct Block {
    judgment: Option<String>,
    outlook: String,
    reasoning: String,
    advice: String,
}

/// Accepts `### 4h`, `## 4h analysis`, `[4h]` and `4h:` headings.
fn parse_heading(line: &str) -> Option<Timeframe> {
    let stripped = line
        .trim()
        .trim_start_matches('#')
        .trim()
        .trim_matches('*')
        .trim();
    let token = if let Some(inner) = stripped.strip_prefix('[') {
        inner.split(']').next()?
    } else {
        stripped
            .split(|c: char| c.is_whitespace() || c == ':')
            .next()?
    };
    let rest_is_heading = stripped.len() <= token.len() + 12;
    token.trim().parse().ok().filter(|_| rest_is_heading)
}

/// Splits `Label: value` lines, tolerating bold markers.
fn parse_field(line: &str) -> Option<(String, String)> {
    let cleaned = line.trim().trim_start_matches(['-', '*', ' ']);
    let (label, value) = cleaned.split_once(':')?;
    let label = label.trim().trim_matches('*').trim().to_lowercase();
    let value = value.trim().trim_start_matches('*').trim().to_string();
    Some((label, value))
}

/// 同一區塊內每個欄位以第一次出現的值為準
fn apply_field(block: &mut Block, label: &str, value: String) -> bool {
    let slot = match label {
        "judgment" | "judgement" | "decision" => {
            if block.judgment.is_none() {
                block.judgment = Some(value);
            }
            return true;
        }
        "outlook" => &mut block.outlook,
        "reasoning" | "rationale" | "reason" => &mut block.reasoning,
        "advice" | "caution" => &mut block.advice,
        _ => return false,
    };
    if slot.is_empty() {
        *slot = value;
    }
    true
}

/// Turns the model's reply into one verdict per requested timeframe, in request order.
pub fn parse_verdicts(response: &str, requested: &[Timeframe]) -> Vec<Verdict> {
    let mut blocks: HashMap<Timeframe, Block> = HashMap::new();
    let mut loose = Block::default();
    let mut current: Option<Timeframe> = None;

    for line in response.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some((label, value)) = parse_field(line) {
            let block = match current {
                Some(tf) => blocks.entry(tf).or_default(),
                None => &mut loose,
            };
            if apply_field(block, &label, value) {
                continue;
            }
        }
        if let Some(tf) = parse_heading(line) {
            current = Some(tf);
            blocks.entry(tf).or_default();
        }
    }

    // 只要求一個時間框架且模型沒有寫標題時，整段回覆視為該時間框架
    if blocks.is_empty() && requested.len() == 1 && loose.judgment.is_some() {
        blocks.insert(requested[0], loose);
    }

    requested
        .iter()
        .map(|tf| match blocks.remove(tf) {
            Some(block) => Verdict {
                timeframe: *tf,
                judgment: block
                    .judgment
                    .as_deref()
                    .map(Judgment::parse)
                    .unwrap_or(Judgment::Unknown),
                outlook: block.outlook,
                reasoning: block.reasoning,
                advice: block.advice,
            },
            None => Verdict::unknown(*tf),
        })
        .collect()
}
