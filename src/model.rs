// src/model.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Identity of the synthetic entry for lines nobody is credited with
pub const UNATTRIBUTED: &str = "unattributed";

/// Identity used when a signature carries neither e-mail nor name
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Revision id as reported by the history provider (a commit hash for git)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RevisionId(pub String);

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The single authoritative coverage state of one line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineRecord {
    pub file: String,
    pub line: u32,
    pub covered: bool,
}

/// The person credited with a line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Committer {
    /// Stable key, derived from the e-mail address when there is one
    pub identity: String,
    pub name: Option<String>,
}

impl Committer {
    pub fn new(identity: impl Into<String>, name: Option<String>) -> Self {
        Committer {
            identity: identity.into(),
            name,
        }
    }

    /// Builds the identity from raw signature fields: lower-cased e-mail,
    /// then the name, then `unknown`.
    pub fn from_signature(email: Option<&str>, name: Option<&str>) -> Self {
        let email = email.map(str::trim).filter(|e| !e.is_empty());
        let name = name.map(str::trim).filter(|n| !n.is_empty());

        let identity = match (email, name) {
            (Some(email), _) => email.to_lowercase(),
            (None, Some(name)) => name.to_string(),
            (None, None) => UNKNOWN_IDENTITY.to_string(),
        };
        // the sentinel is reserved for the synthetic row
        let identity = match (identity == UNATTRIBUTED, email) {
            (true, Some(_)) => format!("email:{}", identity),
            (true, None) => format!("name:{}", identity),
            (false, _) => identity,
        };

        Committer {
            identity,
            name: name.map(String::from),
        }
    }
}

/// "This line's current content was last introduced by this committer at
/// this time."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameEntry {
    pub file: String,
    pub line: u32,
    pub committer: Committer,
    pub revision: RevisionId,
    pub timestamp: DateTime<Utc>,
    /// Set by the provider when the revision sits at or behind the scope
    /// boundary, i.e. the line was not introduced by the change under review
    pub inherited: bool,
}

/// Why a coverable line is not credited to anybody
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnattributedReason {
    /// Unchanged relative to the merge-base
    Inherited,
    /// Last touched outside the configured time window
    OutsideWindow,
    /// The file has no resolvable history
    NoHistory,
    /// Reported by coverage but absent from blame
    NotBlamed,
}

impl fmt::Display for UnattributedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnattributedReason::Inherited => "inherited",
            UnattributedReason::OutsideWindow => "outside window",
            UnattributedReason::NoHistory => "no history",
            UnattributedReason::NotBlamed => "not blamed",
        };
        f.write_str(s)
    }
}

/// Resolved authorship of one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    Committer(Committer),
    Unattributed(UnattributedReason),
}

/// Coverage totals for one committer (or for the unattributed sentinel)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitterStats {
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub total_lines: u64,
    pub covered_lines: u64,
    pub percentage: f64,
}

impl CommitterStats {
    pub fn new(identity: impl Into<String>, name: Option<String>, total_lines: u64, covered_lines: u64) -> Self {
        CommitterStats {
            identity: identity.into(),
            name,
            total_lines,
            covered_lines,
            percentage: percentage(covered_lines, total_lines),
        }
    }

    /// Inclusive: a committer exactly at the threshold meets it.
    pub fn meets(&self, threshold: u8) -> bool {
        meets_threshold(self.covered_lines, self.total_lines, threshold)
    }

    /// Result ordering: ascending percentage, then identity. Percentages are
    /// compared as exact ratios.
    pub fn result_order(&self, other: &Self) -> Ordering {
        let lhs = self.covered_lines as u128 * other.total_lines as u128;
        let rhs = other.covered_lines as u128 * self.total_lines as u128;
        lhs.cmp(&rhs).then_with(|| self.identity.cmp(&other.identity))
    }
}

/// `covered / total * 100`, or 0 for an empty denominator.
pub fn percentage(covered: u64, total: u64) -> f64 {
    match total {
        0 => 0.0,
        _ => covered as f64 / total as f64 * 100.0,
    }
}

/// Exact `covered / total * 100 >= threshold`.
pub fn meets_threshold(covered: u64, total: u64, threshold: u8) -> bool {
    covered as u128 * 100 >= threshold as u128 * total as u128
}
