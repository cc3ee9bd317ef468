use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid location format: {location}")]
    MalformedLocation { location: String },

    #[error("no evidence quotes found (neither evidence_quote nor evidence_quotes)")]
    QuoteMissing,

    #[error("evidence quote {index} is blank")]
    BlankQuote { index: usize },

    #[error("fact has no claim")]
    MissingClaim,

    #[error("fact has no confidence score")]
    MissingConfidence,

    #[error("confidence {value} is outside [0, 1]")]
    ConfidenceOutOfRange { value: f64 },

    #[error("malformed fact record: {reason}")]
    InvalidRecord { reason: String },

    #[error("{failed}/{total} quotes not found in specified lines or nearby (best match: {best_label})")]
    NoMatch {
        failed: usize,
        total: usize,
        best_label: String,
    },

    #[error("no completion service configured for recovery")]
    RecoveryUnavailable,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("completion service timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("completion service failed: {0}")]
    Provider(String),

    #[error("malformed completion response: {0}")]
    Response(String),
}
