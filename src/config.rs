// src/config.rs

use crate::cli::Args;
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

/// Minimum coverage percentage, validated to lie within [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Threshold(u8);

impl Threshold {
    pub fn new(value: i64) -> Result<Threshold> {
        match u8::try_from(value) {
            Ok(v) if v <= 100 => Ok(Threshold(v)),
            _ => Err(Error::InvalidThreshold(value)),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold(80)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive revision-time window. Either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| *at >= from) && self.to.map_or(true, |to| *at <= to)
    }
}

/// Everything the engine needs to decide, validated once.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GatingConfig {
    pub threshold: Threshold,
    pub base_branch: Option<String>,
    pub window: Option<TimeWindow>,
    pub enforce_per_committer: bool,
}

impl GatingConfig {
    pub fn builder() -> GatingConfigBuilder {
        GatingConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GatingConfigBuilder {
    threshold: Option<i64>,
    base_branch: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    enforce_per_committer: bool,
}

impl GatingConfigBuilder {
    pub fn min_threshold(mut self, threshold: i64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn base_branch(mut self, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        self.base_branch = if branch.trim().is_empty() {
            None
        } else {
            Some(branch.trim().to_string())
        };
        self
    }

    pub fn window(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn enforce_per_committer(mut self, enforce: bool) -> Self {
        self.enforce_per_committer = enforce;
        self
    }

    pub fn build(self) -> Result<GatingConfig> {
        let threshold = match self.threshold {
            Some(value) => Threshold::new(value)?,
            None => Threshold::default(),
        };

        let window = match (self.from, self.to) {
            (None, None) => None,
            (Some(from), Some(to)) if from > to => return Err(Error::InvalidTimeWindow { from, to }),
            (from, to) => Some(TimeWindow { from, to }),
        };

        Ok(GatingConfig {
            threshold,
            base_branch: self.base_branch,
            window,
            enforce_per_committer: self.enforce_per_committer,
        })
    }
}

impl TryFrom<&Args> for GatingConfig {
    type Error = Error;

    fn try_from(args: &Args) -> Result<GatingConfig> {
        let mut builder = GatingConfig::builder()
            .min_threshold(args.min_threshold)
            .window(args.from, args.to)
            .enforce_per_committer(args.enforce_per_committer);
        if let Some(branch) = &args.base_branch {
            builder = builder.base_branch(branch.as_str());
        }
        builder.build()
    }
}

/// Accepts RFC 3339, a bare `YYYY-MM-DD` (midnight UTC) or unix seconds.
pub fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(t) = date.and_hms_opt(0, 0, 0) {
            return Ok(t.and_utc());
        }
    }
    if let Ok(seconds) = s.parse::<i64>() {
        if let Some(t) = DateTime::<Utc>::from_timestamp(seconds, 0) {
            return Ok(t);
        }
    }
    Err(format!("invalid timestamp '{}': expected RFC 3339, YYYY-MM-DD or unix seconds", s))
}
