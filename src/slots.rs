//! Deterministic slot extraction
//!
//! Regex and keyword parsing of the values each agent needs. Agents try these
//! first and only fall back to the language model when nothing is found.

use crate::classifier::{contains_phrase, normalize};
use crate::models::{Currency, Geography, RiskBucket, SubRiskLevel};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref INR_PATTERN: Option<Regex> =
        Regex::new(r"(?i)\b(?:inr|rupees?|indian rupees?)\b|₹|(?i:\brs\.?\s*\d)").ok();
    static ref USD_PATTERN: Option<Regex> =
        Regex::new(r"(?i)\b(?:usd|dollars?|us dollars?)\b|\$").ok();
    static ref PERCENT_PATTERN: Option<Regex> =
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:%|percent\b|per cent\b)").ok();
    static ref PREFIX_GAP: Option<Regex> =
        Regex::new(r"(?i)^\s*(?:in|to|for|into|of|on)?\s*$").ok();
    static ref SUFFIX_GAP: Option<Regex> =
        Regex::new(r"(?i)^\s*(?:[:=\-]|at|with)?\s*$").ok();
    static ref GEOGRAPHY_PATTERNS: Vec<(Geography, Regex)> = [
        (Geography::Usa, r"(?i:\b(?:usa|united states|america|american)\b)|\bUS\b"),
        (Geography::India, r"(?i)\b(?:india|indian)\b"),
        (Geography::Japan, r"(?i)\b(?:japan|japanese)\b"),
        (Geography::Europe, r"(?i)\b(?:europe|european|eurozone|eu)\b"),
        (Geography::Uk, r"(?i)\b(?:uk|united kingdom|britain|british|england)\b"),
        (Geography::China, r"(?i)\b(?:china|chinese)\b"),
    ]
    .iter()
    .filter_map(|(geography, pattern)| Regex::new(pattern).ok().map(|re| (*geography, re)))
    .collect();
    static ref VOLATILITY_PATTERNS: Vec<Regex> = [
        r"(?i)\b(?:volatility|vol|swings?|fluctuations?)\b[^\d%]{0,20}?(\d+(?:\.\d+)?)",
        r"(?i)(\d+(?:\.\d+)?)\s*%\s*(?:annual\s+)?(?:volatility|vol\b|swings?)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect();
    static ref DRAWDOWN_PATTERNS: Vec<Regex> = [
        r"(?i)\b(?:drawdown|draw-down|drop|decline|fall|loss|dip)\b[^\d%]{0,20}?(\d+(?:\.\d+)?)",
        r"(?i)(\d+(?:\.\d+)?)\s*%\s*(?:max(?:imum)?\s+)?(?:drawdown|draw-down|drop|decline|fall|loss|dip)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect();
    static ref TAX_PATTERN: Option<Regex> =
        Regex::new(r"(?i)\b(?:elss|80c|tax[\s-]?sav(?:er|ers|ing)|save tax|saving tax|tax benefits?)\b").ok();
    static ref SCENARIO_LETTER: Option<Regex> =
        Regex::new(r"(?i)^\s*(?:option\s*)?\(?([abc])\)?\s*[.!]?\s*$").ok();
}

//
// ================= Currency =================
//

/// Currency named in the message; `None` when absent or when both are named
pub fn extract_currency(text: &str) -> Option<Currency> {
    let inr = INR_PATTERN.as_ref().is_some_and(|re| re.is_match(text));
    let usd = USD_PATTERN.as_ref().is_some_and(|re| re.is_match(text));

    match (inr, usd) {
        (true, false) => Some(Currency::Inr),
        (false, true) => Some(Currency::Usd),
        _ => None,
    }
}

//
// ================= Geography =================
//

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeographyMention {
    pub geography: Geography,
    /// Percentage attached to the mention, if any
    pub percent: Option<f64>,
}

/// Geographies in order of first mention, each with the percentage written
/// next to it. Percentages are read either all before ("60% USA") or all
/// after ("USA 60%") the names, whichever comes first in the message.
pub fn extract_geographies(text: &str) -> Vec<GeographyMention> {
    let mut spans: Vec<(usize, usize, Geography)> = Vec::new();
    for (geography, re) in GEOGRAPHY_PATTERNS.iter() {
        if let Some(m) = re.find(text) {
            spans.push((m.start(), m.end(), *geography));
        }
    }
    spans.sort_by_key(|(start, _, _)| *start);

    let percents = percent_spans(text);
    let prefix_style = match (percents.first(), spans.first()) {
        (Some((p_start, _, _)), Some((g_start, _, _))) => p_start < g_start,
        _ => false,
    };

    spans
        .iter()
        .map(|(start, end, geography)| {
            let percent = if prefix_style {
                percents
                    .iter()
                    .rev()
                    .find(|(_, p_end, _)| {
                        p_end <= start && gap_matches(&PREFIX_GAP, &text[*p_end..*start])
                    })
                    .map(|(_, _, value)| *value)
            } else {
                percents
                    .iter()
                    .find(|(p_start, _, _)| {
                        p_start >= end && gap_matches(&SUFFIX_GAP, &text[*end..*p_start])
                    })
                    .map(|(_, _, value)| *value)
            };
            GeographyMention {
                geography: *geography,
                percent,
            }
        })
        .collect()
}

fn percent_spans(text: &str) -> Vec<(usize, usize, f64)> {
    let Some(re) = PERCENT_PATTERN.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let value = cap.get(1)?.as_str().parse().ok()?;
            Some((whole.start(), whole.end(), value))
        })
        .collect()
}

fn gap_matches(pattern: &Option<Regex>, gap: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(gap))
}

//
// ================= Risk =================
//

/// Answer to "your portfolio falls 30% in a month, do you sell, hold or buy more?"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioChoice {
    Sell,
    Hold,
    BuyMore,
}

impl ScenarioChoice {
    pub fn bucket(&self) -> RiskBucket {
        match self {
            ScenarioChoice::Sell => RiskBucket::Low,
            ScenarioChoice::Hold => RiskBucket::Medium,
            ScenarioChoice::BuyMore => RiskBucket::High,
        }
    }
}

const SELL_WORDS: &[&str] = &[
    "sell", "sell everything", "exit", "get out", "pull out", "withdraw", "cash out",
    "cut my losses", "panic",
];
const HOLD_WORDS: &[&str] = &["hold", "wait", "stay put", "stay invested", "do nothing", "ride it out", "keep"];
const BUY_MORE_WORDS: &[&str] = &[
    "buy more", "invest more", "add more", "buy the dip", "double down", "top up", "average down",
];

/// First percentage in the message, read as the largest tolerable drop
pub fn extract_percent(text: &str) -> Option<f64> {
    percent_spans(text).first().map(|(_, _, value)| *value)
}

/// Bucket implied by a tolerable drop in percent
pub fn bucket_for_drop(drop_pct: f64) -> RiskBucket {
    if drop_pct <= 15.0 {
        RiskBucket::Low
    } else if drop_pct <= 30.0 {
        RiskBucket::Medium
    } else {
        RiskBucket::High
    }
}

/// A bare "A"/"B"/"C" answer or exactly one kind of behaviour word
pub fn extract_scenario_choice(text: &str) -> Option<ScenarioChoice> {
    if let Some(letter) = SCENARIO_LETTER
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|cap| cap.get(1))
    {
        return match letter.as_str().to_lowercase().as_str() {
            "a" => Some(ScenarioChoice::Sell),
            "b" => Some(ScenarioChoice::Hold),
            _ => Some(ScenarioChoice::BuyMore),
        };
    }

    let normalized = normalize(text);
    let buy_more = BUY_MORE_WORDS.iter().any(|w| contains_phrase(&normalized, w));
    let sell = SELL_WORDS.iter().any(|w| contains_phrase(&normalized, w));
    let hold = HOLD_WORDS.iter().any(|w| contains_phrase(&normalized, w));

    match (sell, hold, buy_more) {
        (true, false, false) => Some(ScenarioChoice::Sell),
        (false, true, false) => Some(ScenarioChoice::Hold),
        (false, false, true) => Some(ScenarioChoice::BuyMore),
        _ => None,
    }
}

pub fn mentions_tax_saving(text: &str) -> bool {
    TAX_PATTERN.as_ref().is_some_and(|re| re.is_match(text))
}

//
// ================= Sub-risk =================
//

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SubRiskMention {
    pub target_volatility_pct: Option<f64>,
    pub target_drawdown_pct: Option<f64>,
    pub level: Option<SubRiskLevel>,
}

impl SubRiskMention {
    pub fn is_empty(&self) -> bool {
        self.target_volatility_pct.is_none()
            && self.target_drawdown_pct.is_none()
            && self.level.is_none()
    }
}

const LOWER_WORDS: &[&str] = &[
    "lower end", "low end", "lower", "conservative", "safer", "cautious", "less risk", "minimum",
];
const MIDDLE_WORDS: &[&str] = &["middle", "moderate", "medium", "in between", "mid", "median"];
const UPPER_WORDS: &[&str] = &[
    "upper end", "high end", "higher", "aggressive", "more risk", "maximum", "max",
];

pub fn extract_sub_risk(text: &str) -> SubRiskMention {
    let normalized = normalize(text);
    let lower = LOWER_WORDS.iter().any(|w| contains_phrase(&normalized, w));
    let middle = MIDDLE_WORDS.iter().any(|w| contains_phrase(&normalized, w));
    let upper = UPPER_WORDS.iter().any(|w| contains_phrase(&normalized, w));

    let level = match (lower, middle, upper) {
        (true, false, false) => Some(SubRiskLevel::Low),
        (false, true, false) => Some(SubRiskLevel::Medium),
        (false, false, true) => Some(SubRiskLevel::High),
        _ => None,
    };

    SubRiskMention {
        target_volatility_pct: first_capture(&VOLATILITY_PATTERNS, text),
        target_drawdown_pct: first_capture(&DRAWDOWN_PATTERNS, text),
        level,
    }
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<f64> {
    patterns.iter().find_map(|re| {
        re.captures(text)
            .and_then(|cap| cap.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_extraction() {
        assert_eq!(extract_currency("I'd like to invest in rupees"), Some(Currency::Inr));
        assert_eq!(extract_currency("₹ please"), Some(Currency::Inr));
        assert_eq!(extract_currency("USD"), Some(Currency::Usd));
        assert_eq!(extract_currency("dollars I guess"), Some(Currency::Usd));
        assert_eq!(extract_currency("I want to invest for growth"), None);
        // both named is ambiguous
        assert_eq!(extract_currency("rupees or dollars, not sure"), None);
    }

    #[test]
    fn test_geographies_in_order_of_mention() {
        let mentions = extract_geographies("USA and India");
        let names: Vec<Geography> = mentions.iter().map(|m| m.geography).collect();
        assert_eq!(names, vec![Geography::Usa, Geography::India]);
        assert!(mentions.iter().all(|m| m.percent.is_none()));

        let mentions = extract_geographies("japanese and american funds");
        assert_eq!(mentions[0].geography, Geography::Japan);
        assert_eq!(mentions[1].geography, Geography::Usa);
    }

    #[test]
    fn test_geography_percentages_prefix_and_suffix() {
        let prefix = extract_geographies("60% USA, 40% in India");
        assert_eq!(prefix[0].percent, Some(60.0));
        assert_eq!(prefix[1].percent, Some(40.0));

        let suffix = extract_geographies("USA 70%, Europe: 30%");
        assert_eq!(suffix[0].geography, Geography::Usa);
        assert_eq!(suffix[0].percent, Some(70.0));
        assert_eq!(suffix[1].geography, Geography::Europe);
        assert_eq!(suffix[1].percent, Some(30.0));
    }

    #[test]
    fn test_lowercase_us_is_not_usa() {
        assert!(extract_geographies("let us think about it").is_empty());
        assert_eq!(extract_geographies("US only")[0].geography, Geography::Usa);
    }

    #[test]
    fn test_scenario_choices() {
        assert_eq!(extract_scenario_choice("B"), Some(ScenarioChoice::Hold));
        assert_eq!(extract_scenario_choice("(c)"), Some(ScenarioChoice::BuyMore));
        assert_eq!(extract_scenario_choice("I'd sell everything"), Some(ScenarioChoice::Sell));
        assert_eq!(extract_scenario_choice("probably buy more"), Some(ScenarioChoice::BuyMore));
        // a letter inside a sentence is not an answer
        assert_eq!(extract_scenario_choice("a tough one"), None);
        // conflicting behaviour words
        assert_eq!(extract_scenario_choice("sell or hold, hard to say"), None);
    }

    #[test]
    fn test_drop_thresholds() {
        assert_eq!(bucket_for_drop(15.0), RiskBucket::Low);
        assert_eq!(bucket_for_drop(16.0), RiskBucket::Medium);
        assert_eq!(bucket_for_drop(30.0), RiskBucket::Medium);
        assert_eq!(bucket_for_drop(35.0), RiskBucket::High);
        assert_eq!(extract_percent("I could live with a 20 percent fall"), Some(20.0));
    }

    #[test]
    fn test_tax_saving_mentions() {
        assert!(mentions_tax_saving("I also want to save tax under 80C"));
        assert!(mentions_tax_saving("some ELSS funds please"));
        assert!(!mentions_tax_saving("growth please"));
    }

    #[test]
    fn test_sub_risk_numbers_and_levels() {
        let mention = extract_sub_risk("volatility around 25% and max drawdown 20%");
        assert_eq!(mention.target_volatility_pct, Some(25.0));
        assert_eq!(mention.target_drawdown_pct, Some(20.0));

        let mention = extract_sub_risk("keep it on the lower end");
        assert_eq!(mention.level, Some(SubRiskLevel::Low));
        assert!(mention.target_volatility_pct.is_none());

        assert!(extract_sub_risk("hmm").is_empty());
    }
}
