// src/history.rs

use crate::error::Error;
use crate::model::{BlameEntry, RevisionId};
use thiserror::Error;

/// Revision scope a blame is computed against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlameScope {
    /// Lines last touched at or behind this revision are reported as
    /// inherited. Usually the merge-base with the base branch.
    pub boundary: Option<RevisionId>,
}

impl BlameScope {
    pub fn unbounded() -> Self {
        BlameScope::default()
    }

    pub fn since(boundary: RevisionId) -> Self {
        BlameScope {
            boundary: Some(boundary),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// The version-control state itself cannot be read. Fatal.
    #[error("{0}")]
    Unavailable(String),

    /// This one file has no usable history (binary, untracked, lost rename).
    /// Its lines degrade to unattributed.
    #[error("no resolvable history for {file}: {reason}")]
    Unresolvable { file: String, reason: String },
}

impl HistoryError {
    pub fn unresolvable(file: &str, reason: impl Into<String>) -> Self {
        HistoryError::Unresolvable {
            file: file.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<HistoryError> for Error {
    fn from(err: HistoryError) -> Self {
        Error::HistoryUnavailable(err.to_string())
    }
}

/// Line-level authorship from version control. Graph traversal, rename
/// following and revision resolution all live behind this trait; callers only
/// see flattened per-line entries.
///
/// Implementations are shared across the blame worker pool, hence `Sync`.
pub trait HistoryProvider: Sync {
    /// Authorship of every line of `file` in its current state. Entries
    /// carry `file` exactly as requested, even when the provider had to
    /// follow a rename to find it.
    fn resolve_blame(&self, file: &str, scope: &BlameScope) -> Result<Vec<BlameEntry>, HistoryError>;

    /// Common ancestor of the current revision and `branch`.
    fn merge_base(&self, branch: &str) -> Result<RevisionId, HistoryError>;
}
