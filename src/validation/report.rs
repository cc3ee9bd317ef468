use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::result::ValidationResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_facts: usize,
    pub valid_facts: usize,
    pub invalid_facts: usize,
    pub validation_rate: f64,
    pub recovered_facts: usize,
    pub by_status: BTreeMap<String, usize>,
}

pub fn summarize(results: &[ValidationResult]) -> BatchStats {
    let total_facts = results.len();
    let valid_facts = results.iter().filter(|result| result.is_valid).count();
    let recovered_facts = results.iter().filter(|result| result.was_recovered).count();

    let mut by_status = BTreeMap::new();
    for result in results {
        *by_status
            .entry(result.status.as_str().to_string())
            .or_insert(0_usize) += 1;
    }

    BatchStats {
        total_facts,
        valid_facts,
        invalid_facts: total_facts - valid_facts,
        validation_rate: if total_facts == 0 {
            0.0
        } else {
            valid_facts as f64 / total_facts as f64
        },
        recovered_facts,
        by_status,
    }
}
