use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::validation::{BatchStats, LineRange, QuoteCorrection, ValidationResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceQuote {
    pub quote: String,
    pub source_location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specificity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantitative_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_control_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fact {
    pub claim: String,
    pub source_doc: String,
    pub source_location: String,
    pub evidence_quotes: Vec<EvidenceQuote>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub auto_generated: bool,
    #[serde(flatten)]
    pub metadata: FactMetadata,
}

impl Fact {
    pub fn primary_quote(&self) -> &str {
        self.evidence_quotes
            .first()
            .map(|evidence| evidence.quote.as_str())
            .unwrap_or_default()
    }

    pub fn quotes(&self) -> impl Iterator<Item = &str> {
        self.evidence_quotes
            .iter()
            .map(|evidence| evidence.quote.as_str())
    }

    pub fn apply_corrections(&mut self, corrections: &[QuoteCorrection], location: LineRange) {
        let location_text = location.to_string();
        for correction in corrections {
            if let Some(evidence) = self.evidence_quotes.get_mut(correction.quote_index) {
                evidence.quote = correction.quote.clone();
                evidence.source_location = location_text.clone();
            }
        }
        self.source_location = location_text;
    }

    pub fn apply_recovery(&mut self, result: &ValidationResult) -> bool {
        match (result.was_recovered, result.corrected_location) {
            (true, Some(location)) => {
                self.apply_corrections(&result.corrected_quotes, location);
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawFact {
    claim: Option<String>,
    source_doc: Option<String>,
    source_location: Option<String>,
    evidence_quote: Option<String>,
    evidence_quotes: Option<Vec<RawEvidenceQuote>>,
    confidence: Option<f64>,
    auto_generated: Option<bool>,
    #[serde(flatten)]
    metadata: FactMetadata,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawEvidenceQuote {
    Text(String),
    Structured {
        #[serde(default)]
        quote: Option<String>,
        #[serde(default)]
        source_location: Option<String>,
        #[serde(default)]
        relevance: Option<String>,
    },
}

impl TryFrom<RawFact> for Fact {
    type Error = ValidationError;

    fn try_from(raw: RawFact) -> Result<Self, Self::Error> {
        let claim = raw
            .claim
            .filter(|claim| !claim.trim().is_empty())
            .ok_or(ValidationError::MissingClaim)?;
        let source_location = raw.source_location.unwrap_or_default();

        let evidence_quotes = match raw.evidence_quotes.filter(|quotes| !quotes.is_empty()) {
            Some(quotes) => quotes
                .into_iter()
                .map(|evidence| match evidence {
                    RawEvidenceQuote::Text(quote) => EvidenceQuote {
                        quote,
                        source_location: source_location.clone(),
                        relevance: None,
                    },
                    RawEvidenceQuote::Structured {
                        quote,
                        source_location: quote_location,
                        relevance,
                    } => EvidenceQuote {
                        quote: quote.unwrap_or_default(),
                        source_location: quote_location
                            .unwrap_or_else(|| source_location.clone()),
                        relevance,
                    },
                })
                .collect::<Vec<EvidenceQuote>>(),
            None => match raw.evidence_quote.filter(|quote| !quote.is_empty()) {
                Some(quote) => vec![EvidenceQuote {
                    quote,
                    source_location: source_location.clone(),
                    relevance: None,
                }],
                None => return Err(ValidationError::QuoteMissing),
            },
        };

        if let Some(index) = evidence_quotes
            .iter()
            .position(|evidence| evidence.quote.trim().is_empty())
        {
            return Err(ValidationError::BlankQuote { index: index + 1 });
        }

        let confidence = raw.confidence.ok_or(ValidationError::MissingConfidence)?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::ConfidenceOutOfRange { value: confidence });
        }

        Ok(Self {
            claim,
            source_doc: raw.source_doc.unwrap_or_default(),
            source_location,
            evidence_quotes,
            confidence,
            auto_generated: raw.auto_generated.unwrap_or(false),
            metadata: raw.metadata,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    pub claim: String,
    pub source_location: String,
    pub error: ValidationError,
}

pub type FactRecord = std::result::Result<Fact, RejectedRecord>;

pub fn fact_record_from_value(value: Value) -> FactRecord {
    let raw: RawFact = serde_json::from_value(value).map_err(|error| RejectedRecord {
        claim: String::new(),
        source_location: String::new(),
        error: ValidationError::InvalidRecord {
            reason: error.to_string(),
        },
    })?;

    let claim = raw.claim.clone().unwrap_or_default();
    let source_location = raw.source_location.clone().unwrap_or_default();
    Fact::try_from(raw).map_err(|error| RejectedRecord {
        claim,
        source_location,
        error,
    })
}

pub fn fact_records_from_values(values: Vec<Value>) -> Vec<FactRecord> {
    values.into_iter().map(fact_record_from_value).collect()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FactsContainer {
    Consolidated {
        documents: BTreeMap<String, ConsolidatedDocument>,
    },
    Bare(Vec<Value>),
}

#[derive(Debug, Deserialize)]
struct ConsolidatedDocument {
    #[serde(default)]
    facts: Vec<Value>,
}

pub fn load_fact_records(path: &Path) -> Result<Vec<FactRecord>> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_fact_records(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn parse_fact_records(raw: &[u8]) -> Result<Vec<FactRecord>> {
    let container: FactsContainer =
        serde_json::from_slice(raw).context("facts must be a consolidated object or an array")?;

    let values = match container {
        FactsContainer::Consolidated { documents } => documents
            .into_values()
            .flat_map(|document| document.facts)
            .collect::<Vec<Value>>(),
        FactsContainer::Bare(values) => values,
    };

    Ok(fact_records_from_values(values))
}

pub const REPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub chunk_id: u32,
    pub summary: BatchStats,
    pub results: Vec<ValidationResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub report_version: u32,
    pub generated_at: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,
    pub summary: BatchStats,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ValidationResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<ChunkReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectedFact {
    #[serde(flatten)]
    pub fact: Fact,
    pub was_corrected: bool,
    pub original_quotes: Vec<String>,
    pub correction_confidence: f64,
    pub validation_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_lines: Option<LineRange>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionResult {
    pub fact_index: usize,
    pub claim: String,
    pub was_corrected: bool,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_location: Option<LineRange>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionReport {
    pub generated_at: String,
    pub source_file: String,
    pub text_file: String,
    pub total_rejected: usize,
    pub attempted: usize,
    pub corrected: usize,
    pub failed: usize,
    pub correction_rate: f64,
    pub corrected_facts: Vec<CorrectedFact>,
    pub correction_results: Vec<CorrectionResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_single_quote_desugars_into_one_element_sequence() {
        let raw = br#"[
          {
            "claim": "Backups encrypted with AES-256",
            "source_doc": "soc2.txt",
            "source_location": "Lines 3-3",
            "evidence_quote": "All backups are encrypted using AES-256 encryption.",
            "confidence": 0.9,
            "control_family": "encryption"
          }
        ]"#;

        let records = parse_fact_records(raw).expect("array of facts should parse");
        let fact = records[0].as_ref().expect("fact should be well formed");
        assert_eq!(fact.evidence_quotes.len(), 1);
        assert_eq!(fact.evidence_quotes[0].source_location, "Lines 3-3");
        assert_eq!(fact.metadata.control_family.as_deref(), Some("encryption"));
        assert!(!fact.auto_generated);
    }

    #[test]
    fn consolidated_container_flattens_documents() {
        let raw = br#"{
          "session_id": "sess_abc",
          "documents": {
            "b_report": {"facts": [
              {"claim": "B", "source_location": "Line 1", "evidence_quotes": ["b text"], "confidence": 1.0}
            ]},
            "a_report": {"facts": [
              {"claim": "A", "source_location": "Line 2",
               "evidence_quotes": [{"quote": "a text", "source_location": "Line 2", "relevance": "direct"}],
               "confidence": 0.5}
            ]}
          },
          "total_facts": 2
        }"#;

        let records = parse_fact_records(raw).expect("consolidated container should parse");
        let claims = records
            .iter()
            .map(|record| record.as_ref().expect("valid").claim.clone())
            .collect::<Vec<String>>();
        assert_eq!(claims, vec!["A".to_string(), "B".to_string()]);
        let first = records[0].as_ref().expect("valid");
        assert_eq!(first.evidence_quotes[0].relevance.as_deref(), Some("direct"));
    }

    #[test]
    fn malformed_facts_are_kept_as_rejected_records() {
        let raw = br#"[
          {"claim": "No quotes", "source_location": "Line 1", "confidence": 0.5},
          {"claim": "Blank", "source_location": "Line 1", "evidence_quotes": ["ok", "  "], "confidence": 0.5},
          {"claim": "Too sure", "source_location": "Line 1", "evidence_quote": "x", "confidence": 1.5},
          {"source_location": "Line 1", "evidence_quote": "x", "confidence": 0.5},
          "not an object"
        ]"#;

        let records = parse_fact_records(raw).expect("container should parse");
        let errors = records
            .iter()
            .map(|record| record.as_ref().expect_err("record should be rejected").error.clone())
            .collect::<Vec<ValidationError>>();

        assert_eq!(errors[0], ValidationError::QuoteMissing);
        assert_eq!(errors[1], ValidationError::BlankQuote { index: 2 });
        assert_eq!(errors[2], ValidationError::ConfidenceOutOfRange { value: 1.5 });
        assert_eq!(errors[3], ValidationError::MissingClaim);
        assert!(matches!(errors[4], ValidationError::InvalidRecord { .. }));
        assert_eq!(records[0].as_ref().expect_err("rejected").claim, "No quotes");
    }

    #[test]
    fn unparseable_container_is_fatal() {
        assert!(parse_fact_records(br#"{"facts": 3}"#).is_err());
        assert!(parse_fact_records(b"not json").is_err());
    }

    #[test]
    fn apply_corrections_rewrites_quotes_and_location() {
        let records = parse_fact_records(
            br#"[{"claim": "c", "source_location": "Lines 10-12", "evidence_quotes": ["one", "two"], "confidence": 0.7}]"#,
        )
        .expect("parse");
        let mut fact = records[0].clone().expect("valid");

        fact.apply_corrections(
            &[QuoteCorrection {
                quote_index: 1,
                quote: "corrected two".to_string(),
                confidence: 0.9,
                reasoning: String::new(),
            }],
            LineRange { start: 1, end: 30 },
        );

        assert_eq!(fact.source_location, "Lines 1-30");
        assert_eq!(fact.evidence_quotes[0].quote, "one");
        assert_eq!(fact.evidence_quotes[1].quote, "corrected two");
        assert_eq!(fact.evidence_quotes[1].source_location, "Lines 1-30");
    }
}
