use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

const EXPANDED_SEARCH_SUFFIX: &str = " (expanded search)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn parse(location: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedLocation {
            location: location.to_string(),
        };

        let captures = location_pattern().captures(location).ok_or_else(malformed)?;
        let start = captures
            .get(1)
            .and_then(|value| value.as_str().parse::<usize>().ok())
            .ok_or_else(malformed)?;
        let end = match captures.get(2) {
            Some(value) => value.as_str().parse::<usize>().map_err(|_| malformed())?,
            None => start,
        };

        if start > end {
            return Err(malformed());
        }

        Ok(Self { start, end })
    }

    pub fn expand(self, lines: usize, line_count: usize) -> Self {
        let start = self.start.saturating_sub(lines).max(1);
        let end = self.end.saturating_add(lines).min(line_count.max(1));
        Self {
            start,
            end: end.max(start),
        }
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lines {}-{}", self.start, self.end)
    }
}

impl FromStr for LineRange {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for LineRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LineRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn location_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*lines?\s*(\d+)\s*(?:[-–]\s*(\d+))?\s*(?:\(expanded search\))?\s*$")
            .expect("location pattern compiles")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportedLocation {
    Exact(LineRange),
    Expanded(LineRange),
    Recovered(LineRange),
    Raw(String),
}

impl fmt::Display for ReportedLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(range) | Self::Recovered(range) => write!(f, "{range}"),
            Self::Expanded(range) => write!(f, "{range}{EXPANDED_SEARCH_SUFFIX}"),
            Self::Raw(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for ReportedLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
