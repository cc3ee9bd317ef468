use std::path::Path;

use anyhow::{Result, bail};
use tracing::info;

use crate::cli::ValidateFactsArgs;
use crate::commands::output::{write_results, write_summary};
use crate::completion::optional_service;
use crate::model::{Fact, FactRecord, REPORT_VERSION, ValidationReport, load_fact_records};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};
use crate::validation::{
    FactValidator, SourceIndex, ValidationResult, ValidatorConfig, summarize,
    validate_document_batch,
};

pub fn run(args: ValidateFactsArgs) -> Result<()> {
    let config = ValidatorConfig::from(&args.validation);
    config.validate()?;

    let source = SourceIndex::load(&args.text_file)?;
    let records = load_fact_records(&args.facts_file)?;
    info!(
        facts_file = %args.facts_file.display(),
        facts = records.len(),
        malformed = records.iter().filter(|record| record.is_err()).count(),
        "loaded facts"
    );

    let mut validator = FactValidator::new(config.clone());
    if let Some(service) = optional_service(
        args.completion.completion_command.as_deref(),
        args.completion.no_recovery,
    ) {
        validator = validator.with_recovery(service);
    }

    let results = validate_document_batch(&validator, &source, &records, config.max_workers)?;
    let summary = summarize(&results);

    write_summary(
        &format!("Validation: {}", args.text_file.display()),
        &summary,
    )?;
    write_results(&results, args.show_invalid_only)?;

    if let Some(output_path) = &args.output {
        let report = ValidationReport {
            report_version: REPORT_VERSION,
            generated_at: now_utc_string(),
            mode: "document".to_string(),
            source_text: source.path().map(|path| path.display().to_string()),
            source_sha256: Some(source.sha256()),
            facts_file: Some(args.facts_file.display().to_string()),
            facts_sha256: Some(sha256_file(&args.facts_file)?),
            session_dir: None,
            document_name: None,
            summary: summary.clone(),
            results: results.clone(),
            chunks: Vec::new(),
        };
        write_json_pretty(output_path, &report)?;
        info!(path = %output_path.display(), "wrote validation report");
    }

    if let Some(corrected_path) = &args.corrected_output {
        write_corrected_facts(corrected_path, &records, &results)?;
    }

    if summary.invalid_facts > 0 {
        bail!(
            "{} of {} facts failed validation",
            summary.invalid_facts,
            summary.total_facts
        );
    }

    Ok(())
}

pub fn corrected_facts(records: &[FactRecord], results: &[ValidationResult]) -> Vec<Fact> {
    records
        .iter()
        .zip(results)
        .filter(|(_, result)| result.is_valid)
        .filter_map(|(record, result)| {
            let mut fact = record.as_ref().ok()?.clone();
            fact.apply_recovery(result);
            Some(fact)
        })
        .collect()
}

fn write_corrected_facts(
    path: &Path,
    records: &[FactRecord],
    results: &[ValidationResult],
) -> Result<()> {
    let facts = corrected_facts(records, results);
    write_json_pretty(path, &facts)?;
    info!(
        path = %path.display(),
        facts = facts.len(),
        recovered = results.iter().filter(|result| result.was_recovered).count(),
        "wrote corrected facts"
    );
    Ok(())
}
