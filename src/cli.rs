use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::validation::ValidatorConfig;

#[derive(Parser, Debug)]
#[command(
    name = "frfr",
    version,
    about = "Validate LLM-extracted facts against their source documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    ValidateFacts(ValidateFactsArgs),
    ValidateChunks(ValidateChunksArgs),
    CorrectQuotes(CorrectQuotesArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ValidationArgs {
    #[arg(long, default_value_t = 0.70)]
    pub partial_match_threshold: f64,

    #[arg(long, default_value_t = 0.40)]
    pub recovery_floor: f64,

    #[arg(long, default_value_t = 5)]
    pub expansion_lines: usize,

    #[arg(long, default_value_t = 20)]
    pub recovery_lines: usize,

    #[arg(long, default_value_t = 0.80)]
    pub recovery_min_confidence: f64,

    #[arg(long, default_value_t = 1000)]
    pub recovery_max_tokens: u32,

    #[arg(long, default_value_t = 600)]
    pub recovery_timeout_secs: u64,

    #[arg(long, default_value_t = 5)]
    pub max_workers: usize,
}

impl From<&ValidationArgs> for ValidatorConfig {
    fn from(args: &ValidationArgs) -> Self {
        Self {
            partial_match_threshold: args.partial_match_threshold,
            recovery_floor: args.recovery_floor,
            expansion_lines: args.expansion_lines,
            recovery_lines: args.recovery_lines,
            recovery_min_confidence: args.recovery_min_confidence,
            recovery_max_tokens: args.recovery_max_tokens,
            recovery_timeout: Duration::from_secs(args.recovery_timeout_secs),
            max_workers: args.max_workers,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    #[arg(long)]
    pub completion_command: Option<String>,

    #[arg(long, default_value_t = false)]
    pub no_recovery: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateFactsArgs {
    pub facts_file: PathBuf,

    pub text_file: PathBuf,

    #[command(flatten)]
    pub validation: ValidationArgs,

    #[command(flatten)]
    pub completion: CompletionArgs,

    #[arg(long, default_value_t = false)]
    pub show_invalid_only: bool,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub corrected_output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateChunksArgs {
    #[arg(long)]
    pub session_dir: PathBuf,

    #[arg(long)]
    pub document_name: String,

    #[command(flatten)]
    pub validation: ValidationArgs,

    #[arg(long, default_value_t = false)]
    pub show_invalid_only: bool,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CorrectQuotesArgs {
    pub facts_file: PathBuf,

    pub text_file: PathBuf,

    #[command(flatten)]
    pub validation: ValidationArgs,

    #[arg(long)]
    pub completion_command: Option<String>,

    #[arg(long, default_value_t = 0.30)]
    pub min_match: f64,

    #[arg(long, default_value_t = 30)]
    pub window_lines: usize,

    #[arg(long, default_value_t = 0.0)]
    pub min_confidence: f64,

    #[arg(long, default_value_t = 1500)]
    pub max_tokens: u32,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl CorrectQuotesArgs {
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let stem = self
                .facts_file
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("facts");
            self.facts_file.with_file_name(format!("{stem}_corrected.json"))
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn default_flags_match_validator_defaults() {
        let cli = Cli::try_parse_from(["frfr", "validate-facts", "facts.json", "report.txt"])
            .expect("parse validate-facts");
        let Commands::ValidateFacts(args) = cli.command else {
            panic!("expected validate-facts");
        };

        assert_eq!(ValidatorConfig::from(&args.validation), ValidatorConfig::default());
        assert!(!args.completion.no_recovery);
        assert!(args.output.is_none());
    }

    #[test]
    fn validation_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "frfr",
            "validate-chunks",
            "--session-dir",
            "sessions/abc",
            "--document-name",
            "soc2",
            "--partial-match-threshold",
            "0.8",
            "--max-workers",
            "2",
        ])
        .expect("parse validate-chunks");
        let Commands::ValidateChunks(args) = cli.command else {
            panic!("expected validate-chunks");
        };

        let config = ValidatorConfig::from(&args.validation);
        assert_eq!(config.partial_match_threshold, 0.8);
        assert_eq!(config.max_workers, 2);
        assert_eq!(args.document_name, "soc2");
    }

    #[test]
    fn correct_quotes_output_defaults_next_to_facts_file() {
        let cli = Cli::try_parse_from([
            "frfr",
            "correct-quotes",
            "out/rejected.json",
            "report.txt",
        ])
        .expect("parse correct-quotes");
        let Commands::CorrectQuotes(args) = cli.command else {
            panic!("expected correct-quotes");
        };

        assert_eq!(args.min_match, 0.30);
        assert_eq!(args.window_lines, 30);
        assert_eq!(args.min_confidence, 0.0);
        assert_eq!(args.max_tokens, 1500);
        assert_eq!(args.output_path(), PathBuf::from("out/rejected_corrected.json"));
    }
}
