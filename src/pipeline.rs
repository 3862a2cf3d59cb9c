// src/pipeline.rs

use crate::aggregate::{aggregate, AttributionReport};
use crate::blame::{BlameResolver, Cancellation};
use crate::config::GatingConfig;
use crate::coverage::{CoverageFragment, CoverageIndexBuilder, RejectedFragment};
use crate::error::Result;
use crate::gate::{GateEngine, GateResult};
use crate::history::HistoryProvider;
use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

/// Knobs that shape how the run executes, not what it decides.
#[derive(Clone, Default)]
pub struct RunOptions {
    pub strip_prefixes: Vec<String>,
    pub jobs: Option<usize>,
    pub cancellation: Cancellation,
    /// Budget for the blame stage; the clock starts when blame does
    pub blame_timeout: Option<Duration>,
    pub progress: Option<ProgressBar>,
}

/// Everything one gating decision produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub gate: GateResult,
    pub attribution: AttributionReport,
    /// Fragments the coverage index builder refused
    pub rejected_fragments: Vec<RejectedFragment>,
    /// Files left unattributed for lack of history, with the reason
    pub files_without_history: BTreeMap<String, String>,
}

/// Runs the four stages against one set of fragments.
pub fn run<H, I>(fragments: I, provider: &H, config: &GatingConfig, options: &RunOptions) -> Result<RunOutcome>
where
    H: HistoryProvider + ?Sized,
    I: IntoIterator<Item = CoverageFragment>,
{
    // 1. Coverage index
    let builder = options
        .strip_prefixes
        .iter()
        .fold(CoverageIndexBuilder::new(), |b, prefix| b.strip_prefix(prefix.as_str()));
    let built = builder.build(fragments);
    info!(
        files = built.index.file_count(),
        lines = built.index.line_count(),
        rejected = built.rejected.len(),
        "coverage index ready"
    );

    // 2. Blame
    let cancellation = match options.blame_timeout {
        Some(timeout) => options.cancellation.deadline_in(timeout),
        None => options.cancellation.clone(),
    };
    let mut resolver = BlameResolver::new(provider, config).with_cancellation(cancellation);
    if let Some(jobs) = options.jobs {
        resolver = resolver.with_jobs(jobs)?;
    }
    if let Some(progress) = &options.progress {
        resolver = resolver.with_progress(progress.clone());
    }
    let blame = resolver.resolve(&built.index)?;

    // 3. Join
    let attribution = aggregate(&built.index, &blame);

    // 4. Gate
    let gate = GateEngine::from_config(config).evaluate(&attribution);
    info!(
        verdict = %gate.verdict,
        overall = gate.overall_percentage,
        threshold = gate.threshold.value(),
        violating = gate.violating_committers.len(),
        "gate evaluated"
    );

    Ok(RunOutcome {
        gate,
        attribution,
        rejected_fragments: built.rejected,
        files_without_history: blame.files_without_history().clone(),
    })
}
