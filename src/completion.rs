use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ServiceError;
use crate::util::{run_command_with_timeout, truncate_chars};

pub const DEFAULT_COMPLETION_COMMAND: &str = "claude";
pub const COMPLETION_COMMAND_ENV: &str = "FRFR_COMPLETION_COMMAND";

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub trait TextCompletionService: Send + Sync {
    fn complete(&self, prompt: &str, max_tokens: u32, timeout: Duration) -> Result<String, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct ClaudeCliService {
    command: String,
}

#[derive(Debug, Deserialize)]
struct CliEnvelope {
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    result: String,
    #[serde(default)]
    usage: Option<CliUsage>,
    #[serde(default)]
    total_cost_usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CliUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl ClaudeCliService {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn verify(&self) -> Result<String> {
        let mut command = Command::new(&self.command);
        command.arg("--version");

        let output = run_command_with_timeout(&mut command, VERSION_CHECK_TIMEOUT)
            .with_context(|| format!("completion command not available: {}", self.command))?;
        if output.timed_out || !output.status.is_some_and(|status| status.success()) {
            bail!(
                "{} --version failed: {}",
                self.command,
                output.stderr.trim()
            );
        }

        let version = output.stdout.trim().to_string();
        info!(command = %self.command, version = %version, "completion command available");
        Ok(version)
    }
}

impl TextCompletionService for ClaudeCliService {
    fn complete(&self, prompt: &str, max_tokens: u32, timeout: Duration) -> Result<String, ServiceError> {
        // The CLI has no output-token cap; max_tokens is advisory here.
        debug!(
            command = %self.command,
            prompt_chars = prompt.chars().count(),
            max_tokens,
            "calling completion command"
        );

        let mut command = Command::new(&self.command);
        command
            .arg("-p")
            .arg("--output-format")
            .arg("json")
            .arg(prompt);

        let output = run_command_with_timeout(&mut command, timeout)
            .map_err(|error| ServiceError::Provider(format!("{error:#}")))?;

        if output.timed_out {
            return Err(ServiceError::Timeout {
                seconds: timeout.as_secs(),
            });
        }

        if !output.status.is_some_and(|status| status.success()) {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim()
            } else {
                output.stderr.trim()
            };
            return Err(ServiceError::Provider(detail.to_string()));
        }

        let envelope: CliEnvelope = serde_json::from_str(&output.stdout).map_err(|error| {
            warn!(stdout = %truncate_chars(&output.stdout, 500), "unparseable CLI output");
            ServiceError::Response(error.to_string())
        })?;

        if envelope.is_error {
            return Err(ServiceError::Provider(envelope.result));
        }

        let (input_tokens, output_tokens) = envelope
            .usage
            .map(|usage| (usage.input_tokens, usage.output_tokens))
            .unwrap_or_default();
        info!(
            input_tokens,
            output_tokens,
            cost_usd = envelope.total_cost_usd.unwrap_or_default(),
            "completion finished"
        );

        Ok(envelope.result)
    }
}

pub fn resolve_completion_command(explicit: Option<&str>) -> String {
    explicit
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .or_else(|| {
            std::env::var(COMPLETION_COMMAND_ENV)
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
        .unwrap_or_else(|| DEFAULT_COMPLETION_COMMAND.to_string())
}

pub fn optional_service(
    explicit: Option<&str>,
    disabled: bool,
) -> Option<Arc<dyn TextCompletionService>> {
    if disabled {
        info!("recovery disabled; medium-confidence facts will be rejected");
        return None;
    }

    let service = ClaudeCliService::new(resolve_completion_command(explicit));
    match service.verify() {
        Ok(_) => Some(Arc::new(service)),
        Err(error) => {
            warn!(error = %format!("{error:#}"), "recovery unavailable");
            None
        }
    }
}
