// src/gate.rs

//! Gating Decision Engine.

use crate::aggregate::AttributionReport;
use crate::config::{GatingConfig, Threshold};
use crate::error::Result;
use crate::model::{meets_threshold, percentage, CommitterStats};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Passed,
    Failed,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Passed => f.write_str("PASSED"),
            Verdict::Failed => f.write_str("FAILED"),
        }
    }
}

/// Terminal output of the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateResult {
    pub verdict: Verdict,
    pub passed: bool,
    /// Covered / total over attributed lines only. 100 when nobody can be
    /// judged.
    pub overall_percentage: f64,
    pub attributed_lines: u64,
    pub attributed_covered_lines: u64,
    /// Covered / total over every coverable line, unattributed included
    pub project_percentage: f64,
    pub threshold: Threshold,
    pub enforce_per_committer: bool,
    pub per_committer: Vec<CommitterStats>,
    pub unattributed: Option<CommitterStats>,
    /// Committers strictly below the threshold, whether or not that fails
    /// the gate
    pub violating_committers: BTreeSet<String>,
}

impl GateResult {
    /// Nobody had judgable lines, so the gate passed by convention.
    pub fn is_vacuous(&self) -> bool {
        self.attributed_lines == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateEngine {
    threshold: Threshold,
    enforce_per_committer: bool,
}

impl GateEngine {
    /// Fails with `InvalidThreshold` outside [0, 100].
    pub fn new(min_threshold: i64, enforce_per_committer: bool) -> Result<Self> {
        Ok(GateEngine {
            threshold: Threshold::new(min_threshold)?,
            enforce_per_committer,
        })
    }

    pub fn from_config(config: &GatingConfig) -> Self {
        GateEngine {
            threshold: config.threshold,
            enforce_per_committer: config.enforce_per_committer,
        }
    }

    pub fn evaluate(&self, report: &AttributionReport) -> GateResult {
        let threshold = self.threshold.value();

        let attributed_lines: u64 = report.committers.iter().map(|c| c.total_lines).sum();
        let attributed_covered_lines: u64 = report.committers.iter().map(|c| c.covered_lines).sum();

        let (overall_percentage, overall_ok) = if attributed_lines == 0 {
            (100.0, true)
        } else {
            (
                percentage(attributed_covered_lines, attributed_lines),
                meets_threshold(attributed_covered_lines, attributed_lines, threshold),
            )
        };

        let violating_committers: BTreeSet<String> = report
            .committers
            .iter()
            .filter(|c| !c.meets(threshold))
            .map(|c| c.identity.clone())
            .collect();

        let passed = overall_ok && (!self.enforce_per_committer || violating_committers.is_empty());

        GateResult {
            verdict: if passed { Verdict::Passed } else { Verdict::Failed },
            passed,
            overall_percentage,
            attributed_lines,
            attributed_covered_lines,
            project_percentage: report.project_percentage(),
            threshold: self.threshold,
            enforce_per_committer: self.enforce_per_committer,
            per_committer: report.committers.clone(),
            unattributed: report.unattributed.clone(),
            violating_committers,
        }
    }
}
