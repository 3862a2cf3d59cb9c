// src/git.rs

use crate::history::{BlameScope, HistoryError, HistoryProvider};
use crate::model::{BlameEntry, Committer, RevisionId};
use chrono::{DateTime, Utc};
use git2::{BlameHunk, BlameOptions, Delta, DiffFindOptions, DiffOptions, ErrorCode, ObjectType, Oid, Repository};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// [`HistoryProvider`] backed by a local git repository.
///
/// Only paths, the HEAD commit id and the lazily built rename index are
/// kept; every call opens its own `Repository`, because a handle cannot be
/// shared between the blame workers.
#[derive(Debug, Clone)]
pub struct GitHistory {
    git_dir: PathBuf,
    workdir: PathBuf,
    head: Oid,
    renames: OnceLock<Result<HashMap<String, String>, HistoryError>>,
}

impl GitHistory {
    /// Opens the repository containing `path`.
    ///
    /// CI runners often check the workspace out as a different user than the
    /// one running this tool, so libgit2's owner validation is switched off
    /// (the equivalent of `safe.directory`).
    pub fn open(path: &Path) -> Result<GitHistory, HistoryError> {
        // SAFETY: only flips a process-wide libgit2 option; no repository
        // handle exists yet.
        let owner_validation = unsafe { git2::opts::set_verify_owner_validation(false) };
        owner_validation.map_err(unavailable)?;

        let repo = Repository::discover(path)
            .map_err(|e| HistoryError::Unavailable(format!("{} is not a git repository: {}", path.display(), e)))?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| HistoryError::Unavailable(format!("{} is a bare repository", path.display())))?
            .to_path_buf();
        let head = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| HistoryError::Unavailable(format!("cannot resolve HEAD: {}", e)))?
            .id();

        debug!(workdir = %workdir.display(), %head, "opened git repository");
        Ok(GitHistory {
            git_dir: repo.path().to_path_buf(),
            workdir,
            head,
            renames: OnceLock::new(),
        })
    }

    pub fn head(&self) -> RevisionId {
        RevisionId(self.head.to_string())
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn repo(&self) -> Result<Repository, HistoryError> {
        Repository::open(&self.git_dir).map_err(unavailable)
    }

    /// Repository-relative form of a coverage path.
    fn relative(&self, file: &str) -> String {
        let path = Path::new(file);
        if path.is_absolute() {
            if let Ok(rest) = path.strip_prefix(&self.workdir) {
                return to_slash(rest);
            }
            if let (Ok(canonical), Ok(root)) = (path.canonicalize(), self.workdir.canonicalize()) {
                if let Ok(rest) = canonical.strip_prefix(&root) {
                    return to_slash(rest);
                }
            }
        }
        file.to_string()
    }

    /// Finds the path under which `file` exists at HEAD.
    fn locate(&self, repo: &Repository, file: &str) -> Result<String, HistoryError> {
        let relative = self.relative(file);
        let tree = repo.find_commit(self.head).and_then(|c| c.tree()).map_err(unavailable)?;

        let path = match tree.get_path(Path::new(&relative)) {
            Ok(_) => relative,
            Err(e) if e.code() == ErrorCode::NotFound => self.follow_renames(repo, file, &relative)?,
            Err(e) => return Err(unavailable(e)),
        };

        let entry = tree.get_path(Path::new(&path)).map_err(unavailable)?;
        if entry.kind() != Some(ObjectType::Blob) {
            return Err(HistoryError::unresolvable(file, "not a file at HEAD"));
        }
        let blob = repo.find_blob(entry.id()).map_err(unavailable)?;
        if blob.is_binary() {
            return Err(HistoryError::unresolvable(file, "binary file"));
        }
        Ok(path)
    }

    /// Old name -> name at HEAD for every path renamed on the first-parent
    /// chain. Built by a single walk, shared by every lookup and worker.
    fn renames(&self, repo: &Repository) -> Result<&HashMap<String, String>, HistoryError> {
        self.renames
            .get_or_init(|| RenameMap::walk(repo, self.head).map(|map| map.current))
            .as_ref()
            .map_err(Clone::clone)
    }

    fn follow_renames(&self, repo: &Repository, file: &str, path: &str) -> Result<String, HistoryError> {
        let renames = self.renames(repo)?;
        let tree = repo.find_commit(self.head).and_then(|c| c.tree()).map_err(unavailable)?;
        match renames.get(path) {
            // only a rename chain that ends at a live path counts
            Some(current) if tree.get_path(Path::new(current)).is_ok() => {
                debug!(from = %path, to = %current, "following rename");
                Ok(current.clone())
            }
            _ => Err(HistoryError::unresolvable(file, "not tracked at HEAD")),
        }
    }
}

/// Rename chains replayed in commit order.
#[derive(Debug, Default)]
struct RenameMap {
    /// every name ever renamed away -> where it lives now
    current: HashMap<String, String>,
    /// live name -> the old names that now resolve to it
    aliases: HashMap<String, Vec<String>>,
}

impl RenameMap {
    fn walk(repo: &Repository, head: Oid) -> Result<RenameMap, HistoryError> {
        // 1. Collect the first-parent chain from the root to HEAD
        let mut revwalk = repo.revwalk().map_err(unavailable)?;
        revwalk.push(head).map_err(unavailable)?;
        revwalk.simplify_first_parent().map_err(unavailable)?;
        revwalk
            .set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)
            .map_err(unavailable)?;

        // 2. Diff each commit against its parent with rename detection
        let mut map = RenameMap::default();
        let mut commits = 0usize;
        for oid in revwalk {
            let commit = repo.find_commit(oid.map_err(unavailable)?).map_err(unavailable)?;
            let parent_tree = match commit.parent(0) {
                Ok(parent) => Some(parent.tree().map_err(unavailable)?),
                Err(_) => None,
            };
            let current_tree = commit.tree().map_err(unavailable)?;

            let mut diff_opts = DiffOptions::new();
            diff_opts.ignore_filemode(true);
            let mut diff = repo
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&current_tree), Some(&mut diff_opts))
                .map_err(unavailable)?;
            let mut find_opts = DiffFindOptions::new();
            find_opts.renames(true);
            diff.find_similar(Some(&mut find_opts)).map_err(unavailable)?;

            for delta in diff.deltas() {
                if delta.status() != Delta::Renamed {
                    continue;
                }
                let old = delta.old_file().path().map(to_slash);
                let new = delta.new_file().path().map(to_slash);
                if let (Some(old), Some(new)) = (old, new) {
                    map.record(old, new);
                }
            }
            commits += 1;
        }

        debug!(commits, renamed = map.current.len(), "rename history indexed");
        Ok(map)
    }

    /// Moves every name currently living at `old` to `new`. `old` itself
    /// starts a chain unless an earlier rename already claimed it.
    fn record(&mut self, old: String, new: String) {
        let mut moved = self.aliases.remove(&old).unwrap_or_default();
        for name in &moved {
            self.current.insert(name.clone(), new.clone());
        }
        if !self.current.contains_key(&old) {
            self.current.insert(old.clone(), new.clone());
            moved.push(old);
        }
        self.aliases.entry(new).or_default().extend(moved);
    }
}

impl HistoryProvider for GitHistory {
    fn resolve_blame(&self, file: &str, scope: &BlameScope) -> Result<Vec<BlameEntry>, HistoryError> {
        let repo = self.repo()?;
        let path = self.locate(&repo, file)?;

        let boundary = match &scope.boundary {
            Some(rev) => Some(Oid::from_str(&rev.0).map_err(unavailable)?),
            None => None,
        };

        let mut opts = BlameOptions::new();
        opts.newest_commit(self.head).use_mailmap(true);
        if let Some(boundary) = boundary {
            opts.oldest_commit(boundary);
        }

        let blame = match repo.blame_file(Path::new(&path), Some(&mut opts)) {
            Ok(blame) => blame,
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(HistoryError::unresolvable(file, e.message().to_string()));
            }
            Err(e) => return Err(unavailable(e)),
        };

        let mut commits = CommitCache::new(&repo, boundary);
        let mut entries = Vec::new();
        for hunk in blame.iter() {
            push_hunk(&hunk, file, &mut commits, &mut entries)?;
        }
        debug!(file, path = %path, lines = entries.len(), "blamed");
        Ok(entries)
    }

    fn merge_base(&self, branch: &str) -> Result<RevisionId, HistoryError> {
        let repo = self.repo()?;
        let candidates = [
            branch.to_string(),
            format!("origin/{}", branch),
            format!("refs/remotes/origin/{}", branch),
        ];

        for spec in &candidates {
            let Ok(object) = repo.revparse_single(spec) else {
                continue;
            };
            let base = object.peel_to_commit().map_err(unavailable)?.id();
            let merge_base = repo
                .merge_base(self.head, base)
                .map_err(|e| HistoryError::Unavailable(format!("no merge-base with {}: {}", branch, e)))?;
            debug!(branch, spec = %spec, %merge_base, "resolved merge-base");
            return Ok(RevisionId(merge_base.to_string()));
        }

        Err(HistoryError::Unavailable(format!("cannot resolve base branch {}", branch)))
    }
}

/// Commit time and boundary ancestry, looked up once per commit.
struct CommitCache<'r> {
    repo: &'r Repository,
    boundary: Option<Oid>,
    seen: HashMap<Oid, (DateTime<Utc>, bool)>,
}

impl<'r> CommitCache<'r> {
    fn new(repo: &'r Repository, boundary: Option<Oid>) -> Self {
        CommitCache {
            repo,
            boundary,
            seen: HashMap::new(),
        }
    }

    /// (commit time, is the commit the boundary or one of its ancestors)
    fn lookup(&mut self, id: Oid) -> Result<(DateTime<Utc>, bool), HistoryError> {
        if let Some(&hit) = self.seen.get(&id) {
            return Ok(hit);
        }

        let commit = self.repo.find_commit(id).map_err(unavailable)?;
        let seconds = commit.time().seconds();
        let time = DateTime::<Utc>::from_timestamp(seconds, 0)
            .ok_or_else(|| HistoryError::Unavailable(format!("commit {} has invalid time {}", id, seconds)))?;

        let inherited = match self.boundary {
            Some(boundary) if boundary == id => true,
            Some(boundary) => self.repo.graph_descendant_of(boundary, id).map_err(unavailable)?,
            None => false,
        };

        self.seen.insert(id, (time, inherited));
        Ok((time, inherited))
    }
}

fn push_hunk(
    hunk: &BlameHunk<'_>,
    file: &str,
    commits: &mut CommitCache<'_>,
    entries: &mut Vec<BlameEntry>,
) -> Result<(), HistoryError> {
    let commit_id = hunk.final_commit_id();
    if commit_id.is_zero() {
        return Ok(());
    }

    let signature = hunk.final_signature();
    let committer = Committer::from_signature(signature.email(), signature.name());
    let (timestamp, ancestor) = commits.lookup(commit_id)?;
    let inherited = hunk.is_boundary() || ancestor;
    let revision = RevisionId(commit_id.to_string());

    let start = hunk.final_start_line();
    for offset in 0..hunk.lines_in_hunk() {
        let Ok(line) = u32::try_from(start + offset) else {
            break;
        };
        entries.push(BlameEntry {
            file: file.to_string(),
            line,
            committer: committer.clone(),
            revision: revision.clone(),
            timestamp,
            inherited,
        });
    }
    Ok(())
}

fn unavailable(err: git2::Error) -> HistoryError {
    HistoryError::Unavailable(err.message().to_string())
}

fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
