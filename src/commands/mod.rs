pub mod correct_quotes;
pub mod output;
pub mod validate_chunks;
pub mod validate_facts;
