// src/blame.rs

//! Blame Resolver: per-line authorship under the configured scope.
//!
//! Resolution fans out one task per file on a rayon pool. Each task builds
//! its own slice of attributions; the slices are merged into the
//! [`BlameIndex`] only once every task has finished, so a cancelled or failed
//! run never exposes a partial index.

use crate::config::{GatingConfig, TimeWindow};
use crate::coverage::CoverageIndex;
use crate::error::{Error, Result};
use crate::history::{BlameScope, HistoryError, HistoryProvider};
use crate::model::{Attribution, BlameEntry, UnattributedReason};
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static NO_HISTORY: Attribution = Attribution::Unattributed(UnattributedReason::NoHistory);

/// (file, line) -> attribution for every line the provider reported, plus
/// the files that had no usable history at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlameIndex {
    lines: HashMap<String, BTreeMap<u32, Attribution>>,
    no_history: BTreeMap<String, String>,
}

impl BlameIndex {
    pub fn get(&self, file: &str, line: u32) -> Option<&Attribution> {
        if self.no_history.contains_key(file) {
            return Some(&NO_HISTORY);
        }
        self.lines.get(file).and_then(|lines| lines.get(&line))
    }

    /// Files whose lines all degrade to unattributed, with the reason.
    pub fn files_without_history(&self) -> &BTreeMap<String, String> {
        &self.no_history
    }

    /// Number of lines credited to a real committer.
    pub fn attributed_lines(&self) -> usize {
        self.lines
            .values()
            .flat_map(BTreeMap::values)
            .filter(|a| matches!(a, Attribution::Committer(_)))
            .count()
    }
}

impl FromIterator<((String, u32), Attribution)> for BlameIndex {
    fn from_iter<I: IntoIterator<Item = ((String, u32), Attribution)>>(iter: I) -> Self {
        let mut index = BlameIndex::default();
        for ((file, line), attribution) in iter {
            index.lines.entry(file).or_default().insert(line, attribution);
        }
        index
    }
}

/// Cooperative cancellation shared with the blame workers. Clones observe
/// the same flag.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Cancellation::new().deadline_in(timeout)
    }

    /// Same flag, with a deadline `timeout` from now.
    pub fn deadline_in(&self, timeout: Duration) -> Self {
        Cancellation {
            flag: Arc::clone(&self.flag),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn check(&self, file: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::HistoryUnavailable(format!(
                "blame resolution cancelled while resolving {}",
                file
            )));
        }
        Ok(())
    }
}

/// Outcome of one file's task
enum FileBlame {
    Lines(BTreeMap<u32, Attribution>),
    NoHistory(String),
}

pub struct BlameResolver<'a, H: HistoryProvider + ?Sized> {
    provider: &'a H,
    window: Option<TimeWindow>,
    base_branch: Option<String>,
    pool: Option<rayon::ThreadPool>,
    progress: ProgressBar,
    cancellation: Cancellation,
}

impl<'a, H: HistoryProvider + ?Sized> BlameResolver<'a, H> {
    pub fn new(provider: &'a H, config: &GatingConfig) -> Self {
        BlameResolver {
            provider,
            window: config.window,
            base_branch: config.base_branch.clone(),
            pool: None,
            progress: ProgressBar::hidden(),
            cancellation: Cancellation::new(),
        }
    }

    /// Runs the fan-out on a dedicated pool instead of rayon's global one.
    pub fn with_jobs(mut self, jobs: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("blame-{}", i))
            .build()
            .map_err(|e| Error::HistoryUnavailable(format!("cannot start blame workers: {}", e)))?;
        self.pool = Some(pool);
        Ok(self)
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Resolves authorship for every file of `coverage`.
    pub fn resolve(&self, coverage: &CoverageIndex) -> Result<BlameIndex> {
        // 1. Fix the revision scope once for the whole run
        let scope = match &self.base_branch {
            Some(branch) => {
                let base = self.provider.merge_base(branch)?;
                info!(branch = %branch, merge_base = %base, "scoping blame to changes since merge-base");
                BlameScope::since(base)
            }
            None => BlameScope::unbounded(),
        };

        // 2. Fan out, one task per file
        let files: Vec<&str> = coverage.files().collect();
        self.progress.set_length(files.len() as u64);
        self.progress.set_message("Resolving blame");

        let run = || {
            files
                .par_iter()
                .progress_with(self.progress.clone())
                .map(|file| self.resolve_file(file, &scope).map(|blame| (file.to_string(), blame)))
                .collect::<Result<Vec<_>>>()
        };
        let slices = match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        };
        self.progress.finish_and_clear();
        let slices = slices?;

        // 3. Barrier passed: publish
        let mut index = BlameIndex::default();
        for (file, blame) in slices {
            match blame {
                FileBlame::Lines(lines) => {
                    index.lines.insert(file, lines);
                }
                FileBlame::NoHistory(reason) => {
                    index.no_history.insert(file, reason);
                }
            }
        }
        info!(
            files = files.len(),
            attributed = index.attributed_lines(),
            without_history = index.no_history.len(),
            "blame resolved"
        );
        Ok(index)
    }

    fn resolve_file(&self, file: &str, scope: &BlameScope) -> Result<FileBlame> {
        self.cancellation.check(file)?;

        let entries = match self.provider.resolve_blame(file, scope) {
            Ok(entries) => entries,
            Err(HistoryError::Unresolvable { reason, .. }) => {
                warn!(file, %reason, "no usable history, lines left unattributed");
                return Ok(FileBlame::NoHistory(reason));
            }
            Err(err) => return Err(err.into()),
        };

        // a result that arrives after cancellation is discarded as well
        self.cancellation.check(file)?;

        let lines: BTreeMap<u32, Attribution> = entries
            .into_iter()
            .map(|entry| (entry.line, self.attribute(entry)))
            .collect();
        debug!(file, lines = lines.len(), "file blamed");
        Ok(FileBlame::Lines(lines))
    }

    /// Both scopes must agree before a committer is credited.
    fn attribute(&self, entry: BlameEntry) -> Attribution {
        if self.base_branch.is_some() && entry.inherited {
            return Attribution::Unattributed(UnattributedReason::Inherited);
        }
        if let Some(window) = &self.window {
            if !window.contains(&entry.timestamp) {
                return Attribution::Unattributed(UnattributedReason::OutsideWindow);
            }
        }
        Attribution::Committer(entry.committer)
    }
}
