use serde::Serialize;

pub const DEFAULT_PARTIAL_MATCH_THRESHOLD: f64 = 0.70;

// 7/10 and friends must land on the threshold, not a hair under it.
const RATIO_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Partial,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuoteMatch {
    pub matched: bool,
    pub ratio: f64,
    pub kind: MatchKind,
}

impl QuoteMatch {
    pub fn label(&self) -> String {
        match self.kind {
            MatchKind::Exact => "exact match".to_string(),
            MatchKind::Partial => format!("partial match ({})", format_percent(self.ratio)),
            MatchKind::NotFound => format!("not found (only {} match)", format_percent(self.ratio)),
        }
    }
}

pub fn format_percent(ratio: f64) -> String {
    format!("{:.0}%", ratio * 100.0)
}

pub fn normalize_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<&str>>().join(" ");

    collapsed
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(" \u{2013}", "\u{2013}")
        .replace("\u{2013} ", "\u{2013}")
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteMatcher {
    threshold: f64,
}

impl Default for QuoteMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_PARTIAL_MATCH_THRESHOLD)
    }
}

impl QuoteMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn find(&self, quote: &str, window: &str) -> QuoteMatch {
        let quote_norm = normalize_text(quote);
        if quote_norm.is_empty() {
            return QuoteMatch {
                matched: false,
                ratio: 0.0,
                kind: MatchKind::NotFound,
            };
        }

        let window_norm = normalize_text(window);
        if window_norm.contains(&quote_norm) {
            return QuoteMatch {
                matched: true,
                ratio: 1.0,
                kind: MatchKind::Exact,
            };
        }

        let ratio = ordered_token_ratio(&quote_norm, &window_norm);
        if ratio + RATIO_EPSILON >= self.threshold {
            QuoteMatch {
                matched: true,
                ratio,
                kind: MatchKind::Partial,
            }
        } else {
            QuoteMatch {
                matched: false,
                ratio,
                kind: MatchKind::NotFound,
            }
        }
    }
}

/// Single forward pass over the window: a window token that equals the next
/// expected quote token (case-insensitively) consumes it, anything else is
/// skipped. Returns the fraction of quote tokens consumed.
fn ordered_token_ratio(quote_norm: &str, window_norm: &str) -> f64 {
    let quote_tokens = quote_norm
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<String>>();
    if quote_tokens.is_empty() {
        return 0.0;
    }

    let mut next = 0_usize;
    for token in window_norm.split_whitespace() {
        if next == quote_tokens.len() {
            break;
        }
        if token.to_lowercase() == quote_tokens[next] {
            next += 1;
        }
    }

    next as f64 / quote_tokens.len() as f64
}
