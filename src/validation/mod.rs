mod batch;
mod location;
mod quote_matcher;
mod recovery;
mod report;
mod result;
mod source_index;
mod validator;

pub use batch::{ChunkBatch, validate_chunk_batch, validate_document_batch};
pub use location::LineRange;
pub use quote_matcher::{MatchKind, format_percent};
pub use recovery::RecoveryAgent;
pub use report::{BatchStats, summarize};
pub use result::{QuoteCorrection, ValidationResult};
pub use source_index::SourceIndex;
pub use validator::{FactValidator, ValidatorConfig, failing_quotes};
