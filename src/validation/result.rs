use serde::Serialize;

use crate::model::{Fact, RejectedRecord};
use crate::util::{truncate_chars, truncate_with_ellipsis};

use super::location::{LineRange, ReportedLocation};

const CLAIM_SNIPPET_CHARS: usize = 80;
const QUOTE_SNIPPET_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    ValidExact,
    ValidExpanded,
    ValidChunk,
    Recovered,
    AutoAccepted,
    Rejected,
    RejectedAfterRecovery,
}

impl ValidationStatus {
    pub fn is_valid(self) -> bool {
        !matches!(self, Self::Rejected | Self::RejectedAfterRecovery)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidExact => "valid_exact",
            Self::ValidExpanded => "valid_expanded",
            Self::ValidChunk => "valid_chunk",
            Self::Recovered => "recovered",
            Self::AutoAccepted => "auto_accepted",
            Self::Rejected => "rejected",
            Self::RejectedAfterRecovery => "rejected_after_recovery",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteCorrection {
    pub quote_index: usize,
    pub quote: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub fact_index: usize,
    pub claim: String,
    pub status: ValidationStatus,
    pub is_valid: bool,
    pub error_message: String,
    pub actual_line_range: ReportedLocation,
    pub quote_snippet: String,
    pub was_recovered: bool,
    pub corrected_quote: Option<String>,
    pub corrected_location: Option<LineRange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub corrected_quotes: Vec<QuoteCorrection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_match_ratio: Option<f64>,
}

impl ValidationResult {
    pub(crate) fn accepted(
        fact_index: usize,
        fact: &Fact,
        status: ValidationStatus,
        location: ReportedLocation,
    ) -> Self {
        Self {
            fact_index,
            claim: truncate_chars(&fact.claim, CLAIM_SNIPPET_CHARS),
            status,
            is_valid: status.is_valid(),
            error_message: String::new(),
            actual_line_range: location,
            quote_snippet: quote_snippet(fact, true),
            was_recovered: false,
            corrected_quote: None,
            corrected_location: None,
            corrected_quotes: Vec::new(),
            best_match_ratio: None,
        }
    }

    pub(crate) fn rejected(
        fact_index: usize,
        fact: &Fact,
        status: ValidationStatus,
        error_message: String,
        location: ReportedLocation,
        best_match_ratio: Option<f64>,
    ) -> Self {
        Self {
            fact_index,
            claim: truncate_chars(&fact.claim, CLAIM_SNIPPET_CHARS),
            status,
            is_valid: false,
            error_message,
            actual_line_range: location,
            quote_snippet: quote_snippet(fact, false),
            was_recovered: false,
            corrected_quote: None,
            corrected_location: None,
            corrected_quotes: Vec::new(),
            best_match_ratio,
        }
    }

    pub(crate) fn recovered(
        fact_index: usize,
        fact: &Fact,
        corrections: Vec<QuoteCorrection>,
        location: LineRange,
        best_match_ratio: f64,
    ) -> Self {
        let corrected_quote = corrections.first().map(|correction| correction.quote.clone());
        Self {
            fact_index,
            claim: truncate_chars(&fact.claim, CLAIM_SNIPPET_CHARS),
            status: ValidationStatus::Recovered,
            is_valid: true,
            error_message: String::new(),
            actual_line_range: ReportedLocation::Recovered(location),
            quote_snippet: corrected_quote
                .as_deref()
                .map(|quote| truncate_with_ellipsis(quote, QUOTE_SNIPPET_CHARS))
                .unwrap_or_default(),
            was_recovered: true,
            corrected_quote,
            corrected_location: Some(location),
            corrected_quotes: corrections,
            best_match_ratio: Some(best_match_ratio),
        }
    }

    pub fn from_rejected_record(fact_index: usize, record: &RejectedRecord) -> Self {
        Self {
            fact_index,
            claim: truncate_chars(&record.claim, CLAIM_SNIPPET_CHARS),
            status: ValidationStatus::Rejected,
            is_valid: false,
            error_message: record.error.to_string(),
            actual_line_range: ReportedLocation::Raw(record.source_location.clone()),
            quote_snippet: String::new(),
            was_recovered: false,
            corrected_quote: None,
            corrected_location: None,
            corrected_quotes: Vec::new(),
            best_match_ratio: None,
        }
    }
}

fn quote_snippet(fact: &Fact, with_count: bool) -> String {
    let mut snippet = truncate_with_ellipsis(fact.primary_quote(), QUOTE_SNIPPET_CHARS);
    let extra = fact.evidence_quotes.len().saturating_sub(1);
    if with_count && extra > 0 {
        snippet.push_str(&format!(" (+{extra} more)"));
    }
    snippet
}
