use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rayon::ThreadPool;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::model::FactRecord;

use super::result::ValidationResult;
use super::source_index::SourceIndex;
use super::validator::FactValidator;

#[derive(Debug, Clone)]
pub struct ChunkBatch {
    pub chunk_id: u32,
    pub text: String,
    pub records: Vec<FactRecord>,
}

fn worker_pool(max_workers: usize) -> Result<ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(max_workers.max(1))
        .thread_name(|index| format!("frfr-validate-{index}"))
        .build()
        .context("failed to build validation worker pool")
}

pub fn validate_document_batch(
    validator: &FactValidator,
    source: &SourceIndex,
    records: &[FactRecord],
    max_workers: usize,
) -> Result<Vec<ValidationResult>> {
    info!(
        facts = records.len(),
        max_workers,
        recovery = validator.has_recovery(),
        "validating facts against source document"
    );

    let pool = worker_pool(max_workers)?;
    let by_index: BTreeMap<usize, ValidationResult> = pool.install(|| {
        records
            .par_iter()
            .enumerate()
            .map(|(fact_index, record)| {
                let result = validator.validate_record(record, fact_index, source);
                log_invalid(&result);
                (fact_index, result)
            })
            .collect()
    });

    Ok(by_index.into_values().collect())
}

pub fn validate_chunk_batch(
    validator: &FactValidator,
    chunks: &[ChunkBatch],
    max_workers: usize,
) -> Result<BTreeMap<u32, Vec<ValidationResult>>> {
    info!(
        chunks = chunks.len(),
        facts = chunks.iter().map(|chunk| chunk.records.len()).sum::<usize>(),
        max_workers,
        "validating facts against their chunks"
    );

    let mut offsets = Vec::with_capacity(chunks.len());
    let mut next_index = 0_usize;
    for chunk in chunks {
        offsets.push(next_index);
        next_index += chunk.records.len();
    }

    let pool = worker_pool(max_workers)?;
    let by_chunk: BTreeMap<u32, Vec<ValidationResult>> = pool.install(|| {
        chunks
            .par_iter()
            .zip(offsets.par_iter())
            .map(|(chunk, &offset)| {
                let results = chunk
                    .records
                    .iter()
                    .enumerate()
                    .map(|(position, record)| {
                        let result =
                            validator.validate_record_in_chunk(record, offset + position, &chunk.text);
                        log_invalid(&result);
                        result
                    })
                    .collect::<Vec<ValidationResult>>();

                info!(
                    chunk_id = chunk.chunk_id,
                    validated = results.iter().filter(|result| result.is_valid).count(),
                    rejected = results.iter().filter(|result| !result.is_valid).count(),
                    "chunk validated"
                );
                (chunk.chunk_id, results)
            })
            .collect()
    });

    Ok(by_chunk)
}

fn log_invalid(result: &ValidationResult) {
    if !result.is_valid {
        warn!(
            fact_index = result.fact_index,
            error = %result.error_message,
            "fact invalid"
        );
    }
}
