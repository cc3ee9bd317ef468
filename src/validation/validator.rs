use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::completion::TextCompletionService;
use crate::error::ValidationError;
use crate::model::{Fact, FactRecord};

use super::location::{LineRange, ReportedLocation};
use super::quote_matcher::{
    DEFAULT_PARTIAL_MATCH_THRESHOLD, MatchKind, QuoteMatch, QuoteMatcher, format_percent,
};
use super::recovery::RecoveryAgent;
use super::result::{ValidationResult, ValidationStatus};
use super::source_index::SourceIndex;

pub const DEFAULT_RECOVERY_FLOOR: f64 = 0.40;
pub const DEFAULT_EXPANSION_LINES: usize = 5;
pub const DEFAULT_RECOVERY_LINES: usize = 20;
pub const DEFAULT_RECOVERY_MIN_CONFIDENCE: f64 = 0.80;
pub const DEFAULT_RECOVERY_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_RECOVERY_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_MAX_WORKERS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    pub partial_match_threshold: f64,
    pub recovery_floor: f64,
    pub expansion_lines: usize,
    pub recovery_lines: usize,
    pub recovery_min_confidence: f64,
    pub recovery_max_tokens: u32,
    pub recovery_timeout: Duration,
    pub max_workers: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            partial_match_threshold: DEFAULT_PARTIAL_MATCH_THRESHOLD,
            recovery_floor: DEFAULT_RECOVERY_FLOOR,
            expansion_lines: DEFAULT_EXPANSION_LINES,
            recovery_lines: DEFAULT_RECOVERY_LINES,
            recovery_min_confidence: DEFAULT_RECOVERY_MIN_CONFIDENCE,
            recovery_max_tokens: DEFAULT_RECOVERY_MAX_TOKENS,
            recovery_timeout: Duration::from_secs(DEFAULT_RECOVERY_TIMEOUT_SECS),
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl ValidatorConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("partial match threshold", self.partial_match_threshold),
            ("recovery floor", self.recovery_floor),
            ("recovery min confidence", self.recovery_min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must be within [0, 1], got {value}");
            }
        }

        if self.recovery_floor > self.partial_match_threshold {
            bail!(
                "recovery floor {} is above the partial match threshold {}",
                self.recovery_floor,
                self.partial_match_threshold
            );
        }

        if self.recovery_lines < self.expansion_lines {
            bail!(
                "recovery window ({} lines) is narrower than the expansion window ({} lines)",
                self.recovery_lines,
                self.expansion_lines
            );
        }

        if self.max_workers == 0 {
            bail!("max workers must be at least 1");
        }

        Ok(())
    }
}

#[derive(Clone)]
pub struct FactValidator {
    config: ValidatorConfig,
    matcher: QuoteMatcher,
    recovery: Option<RecoveryAgent>,
}

impl FactValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            matcher: QuoteMatcher::new(config.partial_match_threshold),
            config,
            recovery: None,
        }
    }

    pub fn with_recovery(mut self, service: Arc<dyn TextCompletionService>) -> Self {
        self.recovery = Some(RecoveryAgent::new(service, &self.config));
        self
    }

    pub fn matcher(&self) -> &QuoteMatcher {
        &self.matcher
    }

    pub fn has_recovery(&self) -> bool {
        self.recovery.is_some()
    }

    pub fn validate_record(
        &self,
        record: &FactRecord,
        fact_index: usize,
        source: &SourceIndex,
    ) -> ValidationResult {
        match record {
            Ok(fact) => self.validate_fact(fact, fact_index, source),
            Err(rejected) => ValidationResult::from_rejected_record(fact_index, rejected),
        }
    }

    pub fn validate_record_in_chunk(
        &self,
        record: &FactRecord,
        fact_index: usize,
        chunk_text: &str,
    ) -> ValidationResult {
        match record {
            Ok(fact) => self.validate_fact_in_chunk(fact, fact_index, chunk_text),
            Err(rejected) => ValidationResult::from_rejected_record(fact_index, rejected),
        }
    }

    pub fn validate_fact(&self, fact: &Fact, fact_index: usize, source: &SourceIndex) -> ValidationResult {
        if fact.auto_generated {
            return auto_accepted(fact, fact_index);
        }

        let range = match LineRange::parse(&fact.source_location) {
            Ok(range) => range,
            Err(error) => {
                return ValidationResult::rejected(
                    fact_index,
                    fact,
                    ValidationStatus::Rejected,
                    error.to_string(),
                    ReportedLocation::Raw(fact.source_location.clone()),
                    None,
                );
            }
        };

        let exact_matches = self.match_quotes(fact, &source.text_for(range));
        if exact_matches.iter().all(|found| found.matched) {
            return ValidationResult::accepted(
                fact_index,
                fact,
                ValidationStatus::ValidExact,
                ReportedLocation::Exact(range),
            );
        }

        let expanded_range = range.expand(self.config.expansion_lines, source.line_count());
        let expanded_matches = self.match_quotes(fact, &source.text_for(expanded_range));
        if expanded_matches.iter().all(|found| found.matched) {
            return ValidationResult::accepted(
                fact_index,
                fact,
                ValidationStatus::ValidExpanded,
                ReportedLocation::Expanded(expanded_range),
            );
        }

        let failing = failing_quotes(&expanded_matches);
        let best = best_failing_match(&expanded_matches);
        let no_match = ValidationError::NoMatch {
            failed: failing.len(),
            total: expanded_matches.len(),
            best_label: best.label(),
        };

        if !(self.config.recovery_floor <= best.ratio && best.ratio < self.config.partial_match_threshold) {
            return ValidationResult::rejected(
                fact_index,
                fact,
                ValidationStatus::Rejected,
                no_match.to_string(),
                ReportedLocation::Exact(range),
                Some(best.ratio),
            );
        }

        info!(
            fact_index,
            best_match = %format_percent(best.ratio),
            "medium confidence fact, attempting recovery"
        );

        let Some(agent) = &self.recovery else {
            return ValidationResult::rejected(
                fact_index,
                fact,
                ValidationStatus::RejectedAfterRecovery,
                format!("{no_match}; {}", ValidationError::RecoveryUnavailable),
                ReportedLocation::Exact(range),
                Some(best.ratio),
            );
        };

        let recovery_range = range.expand(self.config.recovery_lines, source.line_count());
        let window = source.text_for(recovery_range);
        match agent.recover_fact(fact, &failing, &window, recovery_range) {
            Ok(corrections) => {
                info!(fact_index, location = %recovery_range, "recovered fact");
                ValidationResult::recovered(fact_index, fact, corrections, recovery_range, best.ratio)
            }
            Err(reason) => ValidationResult::rejected(
                fact_index,
                fact,
                ValidationStatus::RejectedAfterRecovery,
                format!("{no_match}; recovery failed: {reason}"),
                ReportedLocation::Exact(range),
                Some(best.ratio),
            ),
        }
    }

    pub fn validate_fact_in_chunk(
        &self,
        fact: &Fact,
        fact_index: usize,
        chunk_text: &str,
    ) -> ValidationResult {
        if fact.auto_generated {
            return auto_accepted(fact, fact_index);
        }

        let matches = self.match_quotes(fact, chunk_text);
        let failing = failing_quotes(&matches);
        if failing.is_empty() {
            return ValidationResult::accepted(
                fact_index,
                fact,
                ValidationStatus::ValidChunk,
                ReportedLocation::Raw(fact.source_location.clone()),
            );
        }

        let best = best_failing_match(&matches);
        ValidationResult::rejected(
            fact_index,
            fact,
            ValidationStatus::Rejected,
            format!(
                "{}/{} quotes not found in chunk (best match: {})",
                failing.len(),
                matches.len(),
                best.label()
            ),
            ReportedLocation::Raw(fact.source_location.clone()),
            Some(best.ratio),
        )
    }

    pub fn match_quotes(&self, fact: &Fact, window: &str) -> Vec<QuoteMatch> {
        fact.quotes()
            .map(|quote| self.matcher.find(quote, window))
            .collect()
    }
}

fn auto_accepted(fact: &Fact, fact_index: usize) -> ValidationResult {
    debug!(fact_index, "skipping validation for auto-generated fact");
    ValidationResult::accepted(
        fact_index,
        fact,
        ValidationStatus::AutoAccepted,
        ReportedLocation::Raw(fact.source_location.clone()),
    )
}

pub fn failing_quotes(matches: &[QuoteMatch]) -> Vec<usize> {
    matches
        .iter()
        .enumerate()
        .filter(|(_, found)| !found.matched)
        .map(|(index, _)| index)
        .collect()
}

fn best_failing_match(matches: &[QuoteMatch]) -> QuoteMatch {
    matches
        .iter()
        .filter(|found| !found.matched)
        .copied()
        .max_by(|left, right| left.ratio.total_cmp(&right.ratio))
        .unwrap_or(QuoteMatch {
            matched: false,
            ratio: 0.0,
            kind: MatchKind::NotFound,
        })
}
