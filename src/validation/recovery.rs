use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::completion::TextCompletionService;
use crate::error::ServiceError;
use crate::model::Fact;
use crate::util::truncate_chars;

use super::location::LineRange;
use super::quote_matcher::{QuoteMatcher, format_percent};
use super::result::QuoteCorrection;
use super::validator::ValidatorConfig;

pub struct RecoveryRequest<'a> {
    pub claim: &'a str,
    pub original_quote: &'a str,
    pub window: &'a str,
    pub window_range: LineRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredQuote {
    pub quote: String,
    pub location: LineRange,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    Recovered(RecoveredQuote),
    NotRecovered { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecoveryResponse {
    #[serde(default)]
    pub found: bool,
    #[serde(default, alias = "exact_quote")]
    pub quote: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Clone)]
pub struct RecoveryAgent {
    service: Arc<dyn TextCompletionService>,
    matcher: QuoteMatcher,
    min_confidence: f64,
    max_tokens: u32,
    timeout: Duration,
}

impl RecoveryAgent {
    pub fn new(service: Arc<dyn TextCompletionService>, config: &ValidatorConfig) -> Self {
        Self {
            service,
            matcher: QuoteMatcher::new(config.partial_match_threshold),
            min_confidence: config.recovery_min_confidence,
            max_tokens: config.recovery_max_tokens,
            timeout: config.recovery_timeout,
        }
    }

    pub fn recover_quote(&self, request: &RecoveryRequest<'_>) -> RecoveryOutcome {
        info!(
            claim = %truncate_chars(request.claim, 60),
            window = %request.window_range,
            "attempting quote recovery"
        );

        let prompt = build_recovery_prompt(request);
        let response = match self.service.complete(&prompt, self.max_tokens, self.timeout) {
            Ok(response) => response,
            Err(error) => {
                warn!(error = %error, "quote recovery failed");
                return not_recovered(error.to_string());
            }
        };

        let parsed = match parse_recovery_response(&response) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(error = %error, "quote recovery failed");
                return not_recovered(error.to_string());
            }
        };

        if !parsed.found {
            debug!(reasoning = %parsed.reasoning, "service found no supporting text");
            return not_recovered(format!("no supporting text found: {}", parsed.reasoning));
        }

        if parsed.confidence < self.min_confidence {
            return not_recovered(format!(
                "recovery confidence {} below {}",
                format_percent(parsed.confidence),
                format_percent(self.min_confidence)
            ));
        }

        let recheck = self.matcher.find(&parsed.quote, request.window);
        if !recheck.matched {
            warn!(
                quote = %truncate_chars(&parsed.quote, 60),
                "recovered quote is not present in the window"
            );
            return not_recovered(format!("recovered quote failed re-check ({})", recheck.label()));
        }

        info!(
            confidence = %format_percent(parsed.confidence),
            "recovered quote"
        );
        RecoveryOutcome::Recovered(RecoveredQuote {
            quote: parsed.quote,
            location: request.window_range,
            confidence: parsed.confidence,
            reasoning: parsed.reasoning,
        })
    }

    pub fn recover_fact(
        &self,
        fact: &Fact,
        failing_quotes: &[usize],
        window: &str,
        window_range: LineRange,
    ) -> Result<Vec<QuoteCorrection>, String> {
        let mut corrections = Vec::with_capacity(failing_quotes.len());

        for &quote_index in failing_quotes {
            let Some(evidence) = fact.evidence_quotes.get(quote_index) else {
                continue;
            };

            let request = RecoveryRequest {
                claim: &fact.claim,
                original_quote: &evidence.quote,
                window,
                window_range,
            };

            match self.recover_quote(&request) {
                RecoveryOutcome::Recovered(recovered) => corrections.push(QuoteCorrection {
                    quote_index,
                    quote: recovered.quote,
                    confidence: recovered.confidence,
                    reasoning: recovered.reasoning,
                }),
                RecoveryOutcome::NotRecovered { reason } => {
                    return Err(format!("quote {}: {reason}", quote_index + 1));
                }
            }
        }

        Ok(corrections)
    }
}

fn not_recovered(reason: String) -> RecoveryOutcome {
    RecoveryOutcome::NotRecovered { reason }
}

pub fn build_recovery_prompt(request: &RecoveryRequest<'_>) -> String {
    format!(
        r#"An evidence quote extracted for the claim below could not be found in the source document.

**Claim**: {claim}

**Original quote (not found)**: {quote}

**Context** ({range}):
{window}

Find the text in the context that directly supports the claim and copy it word for word.
Do not paraphrase, summarize or fix typos in the copied text.

Respond with ONLY a JSON object:
{{
  "found": true or false,
  "quote": "verbatim text from the context",
  "confidence": 0.0 to 1.0,
  "reasoning": "one sentence"
}}

If the context does not support the claim, set "found" to false.
"#,
        claim = request.claim,
        quote = request.original_quote,
        range = request.window_range,
        window = request.window,
    )
}

pub fn parse_recovery_response(response: &str) -> Result<RecoveryResponse, ServiceError> {
    let payload = extract_fenced_block(response).unwrap_or(response).trim();
    serde_json::from_str(payload).map_err(|error| ServiceError::Response(error.to_string()))
}

fn extract_fenced_block(text: &str) -> Option<&str> {
    let (open, marker_len) = match text.find("```json") {
        Some(position) => (position, "```json".len()),
        None => (text.find("```")?, "```".len()),
    };

    let body_start = open + marker_len;
    let body = &text[body_start..];
    let body_end = body.find("```").unwrap_or(body.len());
    Some(&body[..body_end])
}
