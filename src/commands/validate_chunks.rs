use anyhow::{Result, bail};
use tracing::info;

use crate::cli::ValidateChunksArgs;
use crate::commands::output::{write_results, write_summary};
use crate::model::{ChunkReport, REPORT_VERSION, ValidationReport};
use crate::session::SessionDir;
use crate::util::{now_utc_string, write_json_pretty};
use crate::validation::{
    FactValidator, ValidationResult, ValidatorConfig, summarize, validate_chunk_batch,
};

pub fn run(args: ValidateChunksArgs) -> Result<()> {
    let config = ValidatorConfig::from(&args.validation);
    config.validate()?;

    let session = SessionDir::open(&args.session_dir)?;
    let chunks = session.load_chunk_batches(&args.document_name)?;

    let validator = FactValidator::new(config.clone());
    let by_chunk = validate_chunk_batch(&validator, &chunks, config.max_workers)?;

    let chunk_reports = by_chunk
        .into_iter()
        .map(|(chunk_id, results)| ChunkReport {
            chunk_id,
            summary: summarize(&results),
            results,
        })
        .collect::<Vec<ChunkReport>>();

    let all_results = chunk_reports
        .iter()
        .flat_map(|chunk| chunk.results.iter().cloned())
        .collect::<Vec<ValidationResult>>();
    let summary = summarize(&all_results);

    write_summary(
        &format!(
            "Chunk validation: {} ({} chunks)",
            args.document_name,
            chunk_reports.len()
        ),
        &summary,
    )?;
    for chunk in &chunk_reports {
        info!(
            chunk_id = chunk.chunk_id,
            valid = chunk.summary.valid_facts,
            total = chunk.summary.total_facts,
            "chunk summary"
        );
    }
    write_results(&all_results, args.show_invalid_only)?;

    if let Some(output_path) = &args.output {
        let report = ValidationReport {
            report_version: REPORT_VERSION,
            generated_at: now_utc_string(),
            mode: "chunk".to_string(),
            source_text: None,
            source_sha256: None,
            facts_file: None,
            facts_sha256: None,
            session_dir: Some(session.root().display().to_string()),
            document_name: Some(args.document_name.clone()),
            summary: summary.clone(),
            results: Vec::new(),
            chunks: chunk_reports,
        };
        write_json_pretty(output_path, &report)?;
        info!(path = %output_path.display(), "wrote chunk validation report");
    }

    if summary.invalid_facts > 0 {
        bail!(
            "{} of {} facts failed chunk validation",
            summary.invalid_facts,
            summary.total_facts
        );
    }

    Ok(())
}
