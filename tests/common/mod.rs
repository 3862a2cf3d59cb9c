// tests/common/mod.rs

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use committer_coverage::history::{BlameScope, HistoryError, HistoryProvider};
use committer_coverage::model::{BlameEntry, Committer, RevisionId};
use git2::{IndexAddOption, Oid, Repository, RepositoryInitOptions, Signature, Time};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(seconds, 0).unwrap()
}

/// In-memory history: per-file blame plus a fixed merge-base per branch.
#[derive(Default)]
pub struct FakeHistory {
    files: HashMap<String, Vec<BlameEntry>>,
    unresolvable: HashMap<String, String>,
    branches: HashMap<String, RevisionId>,
}

impl FakeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `lines` of `file` to `who`, last changed at `time`.
    pub fn lines(mut self, file: &str, lines: impl IntoIterator<Item = u32>, who: &str, time: i64) -> Self {
        self.push(file, lines, who, time, false);
        self
    }

    /// Like [`FakeHistory::lines`], but the lines predate the merge-base.
    pub fn inherited(mut self, file: &str, lines: impl IntoIterator<Item = u32>, who: &str, time: i64) -> Self {
        self.push(file, lines, who, time, true);
        self
    }

    pub fn unresolvable(mut self, file: &str, reason: &str) -> Self {
        self.unresolvable.insert(file.to_string(), reason.to_string());
        self
    }

    pub fn branch(mut self, name: &str, merge_base: &str) -> Self {
        self.branches.insert(name.to_string(), RevisionId(merge_base.to_string()));
        self
    }

    fn push(&mut self, file: &str, lines: impl IntoIterator<Item = u32>, who: &str, time: i64, inherited: bool) {
        let entries = self.files.entry(file.to_string()).or_default();
        for line in lines {
            entries.push(BlameEntry {
                file: file.to_string(),
                line,
                committer: Committer::new(who, None),
                revision: RevisionId(format!("{}-{}", who, time)),
                timestamp: at(time),
                inherited,
            });
        }
    }
}

impl HistoryProvider for FakeHistory {
    fn resolve_blame(&self, file: &str, scope: &BlameScope) -> Result<Vec<BlameEntry>, HistoryError> {
        if let Some(reason) = self.unresolvable.get(file) {
            return Err(HistoryError::unresolvable(file, reason.clone()));
        }
        let entries = self.files.get(file).cloned().unwrap_or_default();
        Ok(entries
            .into_iter()
            .map(|mut entry| {
                entry.inherited &= scope.boundary.is_some();
                entry
            })
            .collect())
    }

    fn merge_base(&self, branch: &str) -> Result<RevisionId, HistoryError> {
        self.branches
            .get(branch)
            .cloned()
            .ok_or_else(|| HistoryError::Unavailable(format!("unknown branch {}", branch)))
    }
}

/// A throwaway git repository with deterministic authors and times.
pub struct TestRepo {
    dir: TempDir,
    pub repo: Repository,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        // HEAD lives on its own branch so tests can freely create `main`
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("work");
        let repo = Repository::init_opts(dir.path(), &opts).expect("init repository");
        TestRepo { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, file: &str, contents: impl AsRef<[u8]>) {
        let path = self.dir.path().join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(path, contents).expect("write file");
    }

    pub fn rename(&self, from: &str, to: &str) {
        fs::rename(self.dir.path().join(from), self.dir.path().join(to)).expect("rename file");
    }

    /// Stages the whole work tree, deletions included, and commits it on HEAD.
    pub fn commit(&self, name: &str, email: &str, time: i64, message: &str) -> Oid {
        let mut index = self.repo.index().expect("open index");
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .expect("stage files");
        index.update_all(["*"].iter(), None).expect("stage deletions");
        index.write().expect("write index");
        let tree_id = index.write_tree().expect("write tree");
        let tree = self.repo.find_tree(tree_id).expect("find tree");

        let signature = Signature::new(name, email, &Time::new(time, 0)).expect("signature");
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .expect("commit")
    }

    /// Points a local branch at `target`, leaving HEAD where it is.
    pub fn branch(&self, name: &str, target: Oid) {
        let commit = self.repo.find_commit(target).expect("find commit");
        self.repo.branch(name, &commit, true).expect("create branch");
    }
}

/// `count` numbered source lines, `prefix` keeps files distinguishable.
pub fn source(prefix: &str, count: u32) -> String {
    (1..=count).map(|i| format!("{} line {}\n", prefix, i)).collect()
}
