use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::info;

use super::location::LineRange;
use super::quote_matcher::QuoteMatcher;

#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    path: Option<PathBuf>,
    lines: Vec<String>,
}

impl SourceIndex {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read source text: {}", path.display()))?;
        let mut index = Self::from_text(&text);
        index.path = Some(path.to_path_buf());

        info!(
            path = %path.display(),
            lines = index.line_count(),
            "loaded source text"
        );
        Ok(index)
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            path: None,
            lines: text.split_inclusive('\n').map(ToOwned::to_owned).collect(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn get_text(&self, start: usize, end: usize) -> String {
        let start_idx = start.saturating_sub(1);
        let end_idx = end.min(self.lines.len());
        if start_idx >= end_idx {
            return String::new();
        }
        self.lines[start_idx..end_idx].concat()
    }

    pub fn text_for(&self, range: LineRange) -> String {
        self.get_text(range.start, range.end)
    }

    /// Smallest span inside `within` that still satisfies the matcher, found by
    /// shrinking from both ends. Matching is monotonic in the window, so the
    /// greedy shrink does not skip over a tighter span.
    pub fn locate(&self, quote: &str, matcher: &QuoteMatcher, within: LineRange) -> Option<LineRange> {
        let within = LineRange {
            start: within.start.max(1),
            end: within.end.min(self.line_count()),
        };
        if within.start > within.end || !matcher.find(quote, &self.text_for(within)).matched {
            return None;
        }

        let mut start = within.start;
        let mut end = within.end;
        while start < end && matcher.find(quote, &self.get_text(start + 1, end)).matched {
            start += 1;
        }
        while end > start && matcher.find(quote, &self.get_text(start, end - 1)).matched {
            end -= 1;
        }

        Some(LineRange { start, end })
    }

    pub fn sha256(&self) -> String {
        let mut hasher = Sha256::new();
        for line in &self.lines {
            hasher.update(line.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}
