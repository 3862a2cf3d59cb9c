// src/aggregate.rs

//! Attribution Aggregator: joins coverage with blame.
//!
//! The coverage index decides which lines count. A coverable line with no
//! blame is unattributed; a blamed line the coverage tool never reported is
//! not coverable and is ignored.

use crate::blame::BlameIndex;
use crate::coverage::CoverageIndex;
use crate::model::{percentage, Attribution, CommitterStats, UnattributedReason, UNATTRIBUTED};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Per-file totals. `total_lines` includes unattributed lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileStats {
    pub file: String,
    pub total_lines: u64,
    pub covered_lines: u64,
    pub attributed_lines: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionReport {
    /// Real committers, ascending percentage then identity
    pub committers: Vec<CommitterStats>,
    /// Synthetic entry; `None` when every line is attributed
    pub unattributed: Option<CommitterStats>,
    pub unattributed_by_reason: BTreeMap<UnattributedReason, u64>,
    pub files: Vec<FileStats>,
    /// Every coverable line, attributed or not
    pub total_lines: u64,
    pub covered_lines: u64,
}

impl AttributionReport {
    pub fn project_percentage(&self) -> f64 {
        percentage(self.covered_lines, self.total_lines)
    }
}

#[derive(Default)]
struct Tally {
    name: Option<String>,
    total: u64,
    covered: u64,
}

impl Tally {
    fn add(&mut self, covered: bool) {
        self.total += 1;
        self.covered += u64::from(covered);
    }
}

pub fn aggregate(coverage: &CoverageIndex, blame: &BlameIndex) -> AttributionReport {
    let mut committers: HashMap<String, Tally> = HashMap::new();
    let mut unattributed = Tally::default();
    let mut by_reason: BTreeMap<UnattributedReason, u64> = BTreeMap::new();
    let mut files = Vec::with_capacity(coverage.file_count());

    for file in coverage.files() {
        let Some(lines) = coverage.file_lines(file) else {
            continue;
        };
        let mut file_tally = Tally::default();
        let mut attributed = 0;

        for (&line, &covered) in lines {
            file_tally.add(covered);
            match blame.get(file, line) {
                Some(Attribution::Committer(committer)) => {
                    attributed += 1;
                    let tally = committers.entry(committer.identity.clone()).or_default();
                    if tally.name.is_none() {
                        tally.name = committer.name.clone();
                    }
                    tally.add(covered);
                }
                Some(Attribution::Unattributed(reason)) => {
                    unattributed.add(covered);
                    *by_reason.entry(*reason).or_default() += 1;
                }
                None => {
                    unattributed.add(covered);
                    *by_reason.entry(UnattributedReason::NotBlamed).or_default() += 1;
                }
            }
        }

        files.push(FileStats {
            file: file.to_string(),
            total_lines: file_tally.total,
            covered_lines: file_tally.covered,
            attributed_lines: attributed,
            percentage: percentage(file_tally.covered, file_tally.total),
        });
    }

    let mut committers: Vec<CommitterStats> = committers
        .into_iter()
        .filter(|(_, tally)| tally.total > 0)
        .map(|(identity, tally)| CommitterStats::new(identity, tally.name, tally.total, tally.covered))
        .collect();
    committers.sort_by(CommitterStats::result_order);

    let total_lines: u64 = files.iter().map(|f| f.total_lines).sum();
    let covered_lines: u64 = files.iter().map(|f| f.covered_lines).sum();
    debug!(
        committers = committers.len(),
        unattributed = unattributed.total,
        total_lines,
        "aggregated"
    );

    AttributionReport {
        committers,
        unattributed: (unattributed.total > 0)
            .then(|| CommitterStats::new(UNATTRIBUTED, None, unattributed.total, unattributed.covered)),
        unattributed_by_reason: by_reason,
        files,
        total_lines,
        covered_lines,
    }
}
