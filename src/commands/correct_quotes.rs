use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cli::CorrectQuotesArgs;
use crate::completion::{ClaudeCliService, resolve_completion_command};
use crate::model::{CorrectedFact, CorrectionReport, CorrectionResult, Fact, load_fact_records};
use crate::util::{now_utc_string, truncate_chars, write_json_pretty};
use crate::validation::{
    FactValidator, LineRange, MatchKind, RecoveryAgent, SourceIndex, ValidatorConfig,
    failing_quotes, format_percent, validate_document_batch,
};

const CORRECTION_CLAIM_CHARS: usize = 100;
const EXACT_VALIDATION_SCORE: f64 = 1.0;
const PARTIAL_VALIDATION_SCORE: f64 = 0.8;

pub fn run(args: CorrectQuotesArgs) -> Result<()> {
    if !(0.0..=1.0).contains(&args.min_match) {
        bail!("--min-match must be within [0, 1], got {}", args.min_match);
    }

    let config = ValidatorConfig {
        recovery_lines: args.window_lines,
        ..ValidatorConfig::from(&args.validation)
    };
    config.validate()?;

    let service = ClaudeCliService::new(resolve_completion_command(
        args.completion_command.as_deref(),
    ));
    service
        .verify()
        .context("correct-quotes needs a working completion command")?;

    let source = SourceIndex::load(&args.text_file)?;
    let records = load_fact_records(&args.facts_file)?;

    let agent_config = correction_agent_config(&config, args.min_confidence, args.max_tokens);
    agent_config.validate()?;

    let validator = FactValidator::new(config.clone());
    let agent = RecoveryAgent::new(Arc::new(service), &agent_config);
    let corrector = QuoteCorrector {
        validator: &validator,
        agent: &agent,
        source: &source,
        window_lines: args.window_lines,
    };

    let results = validate_document_batch(&validator, &source, &records, config.max_workers)?;
    let candidates = records
        .iter()
        .zip(&results)
        .filter(|(_, result)| !result.is_valid)
        .filter_map(|(record, result)| {
            let fact = record.as_ref().ok()?;
            Some((result.fact_index, fact, result.best_match_ratio))
        })
        .collect::<Vec<(usize, &Fact, Option<f64>)>>();
    let total_rejected = results.iter().filter(|result| !result.is_valid).count();

    let attempts = candidates
        .into_iter()
        .filter(|(fact_index, _, ratio)| match ratio {
            Some(ratio) if *ratio >= args.min_match => true,
            _ => {
                debug!(fact_index, "skipping correction below minimum match");
                false
            }
        })
        .map(|(fact_index, fact, _)| (fact_index, fact))
        .collect::<Vec<(usize, &Fact)>>();

    info!(
        total_rejected,
        attempted = attempts.len(),
        min_match = %format_percent(args.min_match),
        "correcting rejected facts"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_workers)
        .thread_name(|index| format!("frfr-correct-{index}"))
        .build()
        .context("failed to build correction worker pool")?;
    let outcomes: BTreeMap<usize, CorrectionOutcome> = pool.install(|| {
        attempts
            .par_iter()
            .map(|&(fact_index, fact)| (fact_index, corrector.correct(fact_index, fact)))
            .collect()
    });

    let attempted = outcomes.len();
    let mut corrected_facts = Vec::new();
    let mut correction_results = Vec::with_capacity(attempted);
    for outcome in outcomes.into_values() {
        correction_results.push(outcome.result);
        corrected_facts.extend(outcome.fact);
    }
    let corrected = corrected_facts.len();

    let report = CorrectionReport {
        generated_at: now_utc_string(),
        source_file: args.facts_file.display().to_string(),
        text_file: args.text_file.display().to_string(),
        total_rejected,
        attempted,
        corrected,
        failed: total_rejected - corrected,
        correction_rate: if total_rejected == 0 {
            0.0
        } else {
            corrected as f64 / total_rejected as f64
        },
        corrected_facts,
        correction_results,
    };

    let output_path = args.output_path();
    write_json_pretty(&output_path, &report)?;
    info!(
        path = %output_path.display(),
        corrected,
        failed = report.failed,
        rate = %format_percent(report.correction_rate),
        "wrote correction report"
    );

    Ok(())
}

fn correction_agent_config(
    config: &ValidatorConfig,
    min_confidence: f64,
    max_tokens: u32,
) -> ValidatorConfig {
    ValidatorConfig {
        recovery_min_confidence: min_confidence,
        recovery_max_tokens: max_tokens,
        ..config.clone()
    }
}

#[derive(Debug)]
struct CorrectionOutcome {
    fact: Option<CorrectedFact>,
    result: CorrectionResult,
}

struct QuoteCorrector<'a> {
    validator: &'a FactValidator,
    agent: &'a RecoveryAgent,
    source: &'a SourceIndex,
    window_lines: usize,
}

impl QuoteCorrector<'_> {
    fn correct(&self, fact_index: usize, fact: &Fact) -> CorrectionOutcome {
        let claim = truncate_chars(&fact.claim, CORRECTION_CLAIM_CHARS);
        let failed = |reasoning: String| CorrectionOutcome {
            fact: None,
            result: CorrectionResult {
                fact_index,
                claim: claim.clone(),
                was_corrected: false,
                confidence: 0.0,
                reasoning,
                corrected_location: None,
            },
        };

        let range = match LineRange::parse(&fact.source_location) {
            Ok(range) => range,
            Err(error) => return failed(error.to_string()),
        };
        let window_range = range.expand(self.window_lines, self.source.line_count());
        let window = self.source.text_for(window_range);

        let failing = failing_quotes(&self.validator.match_quotes(fact, &window));
        let (corrections, confidence, reasoning) = if failing.is_empty() {
            (
                Vec::new(),
                1.0,
                "quotes found verbatim in the widened window".to_string(),
            )
        } else {
            match self.agent.recover_fact(fact, &failing, &window, window_range) {
                Ok(corrections) => {
                    let confidence = corrections
                        .iter()
                        .map(|correction| correction.confidence)
                        .fold(1.0, f64::min);
                    let reasoning = corrections
                        .iter()
                        .map(|correction| correction.reasoning.as_str())
                        .filter(|reasoning| !reasoning.is_empty())
                        .collect::<Vec<&str>>()
                        .join("; ");
                    (corrections, confidence, reasoning)
                }
                Err(reason) => {
                    warn!(fact_index, reason = %reason, "quote correction failed");
                    return failed(reason);
                }
            }
        };

        let mut corrected = fact.clone();
        corrected.apply_corrections(&corrections, window_range);
        let validation_score = if self
            .validator
            .match_quotes(&corrected, &window)
            .iter()
            .all(|found| found.kind == MatchKind::Exact)
        {
            EXACT_VALIDATION_SCORE
        } else {
            PARTIAL_VALIDATION_SCORE
        };
        let quote_lines =
            self.source
                .locate(corrected.primary_quote(), self.validator.matcher(), window_range);

        info!(
            fact_index,
            confidence = %format_percent(confidence),
            location = %window_range,
            "corrected quote"
        );

        CorrectionOutcome {
            fact: Some(CorrectedFact {
                fact: corrected,
                was_corrected: true,
                original_quotes: fact.quotes().map(ToOwned::to_owned).collect(),
                correction_confidence: confidence,
                validation_score,
                quote_lines,
            }),
            result: CorrectionResult {
                fact_index,
                claim,
                was_corrected: true,
                confidence,
                reasoning,
                corrected_location: Some(window_range),
            },
        }
    }
}
