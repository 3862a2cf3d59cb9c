// src/coverage/mod.rs

//! Coverage Index Builder and the report adapters that feed it.
//!
//! Report adapters turn a file on disk into [`CoverageFragment`]s. The
//! [`CoverageIndexBuilder`] normalizes any number of fragments into one
//! [`CoverageIndex`], merging duplicate lines with union semantics: a line is
//! covered if any fragment says so.

use crate::error::{Error, Result};
use crate::model::LineRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

pub mod cobertura;
pub mod lcov;

/// One line of a fragment, as reported by the coverage tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentLine {
    /// Signed so that bogus report values reach the builder and get rejected
    pub number: i64,
    pub covered: bool,
}

impl FragmentLine {
    pub fn new(number: i64, covered: bool) -> Self {
        FragmentLine { number, covered }
    }

    pub fn from_hits(number: i64, hits: u64) -> Self {
        FragmentLine {
            number,
            covered: hits > 0,
        }
    }
}

/// Coverage of one file from one report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageFragment {
    pub file: String,
    pub lines: Vec<FragmentLine>,
}

impl CoverageFragment {
    pub fn new(file: impl Into<String>) -> Self {
        CoverageFragment {
            file: file.into(),
            lines: Vec::new(),
        }
    }

    pub fn with_lines<I>(file: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = (i64, bool)>,
    {
        CoverageFragment {
            file: file.into(),
            lines: lines
                .into_iter()
                .map(|(number, covered)| FragmentLine::new(number, covered))
                .collect(),
        }
    }

    pub fn push(&mut self, line: FragmentLine) {
        self.lines.push(line);
    }
}

/// Why a fragment was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoverageDataError {
    #[error("malformed coverage data: empty file name")]
    EmptyFileName,
    #[error("malformed coverage data: line number {line} is not positive")]
    NonPositiveLine { line: i64 },
    #[error("malformed coverage data: line number {line} is out of range")]
    LineOutOfRange { line: i64 },
}

/// A fragment the builder refused, kept for the caller to report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedFragment {
    /// Position of the fragment in the input sequence
    pub index: usize,
    pub file: String,
    pub error: CoverageDataError,
}

/// Canonical (file, line) -> covered mapping. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageIndex {
    files: BTreeMap<String, BTreeMap<u32, bool>>,
}

impl CoverageIndex {
    pub fn get(&self, file: &str, line: u32) -> Option<LineRecord> {
        self.files
            .get(file)
            .and_then(|lines| lines.get(&line))
            .map(|&covered| LineRecord {
                file: file.to_string(),
                line,
                covered,
            })
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn file_lines(&self, file: &str) -> Option<&BTreeMap<u32, bool>> {
        self.files.get(file)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn line_count(&self) -> usize {
        self.files.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Result of a build: the index plus whatever had to be thrown away.
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub index: CoverageIndex,
    pub rejected: Vec<RejectedFragment>,
}

/// Builds a [`CoverageIndex`] from fragments.
#[derive(Debug, Clone, Default)]
pub struct CoverageIndexBuilder {
    strip_prefixes: Vec<String>,
}

impl CoverageIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix removed from file names before keying. The first matching
    /// prefix wins.
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = normalize_path(&prefix.into());
        if !prefix.is_empty() {
            self.strip_prefixes.push(prefix);
        }
        self
    }

    pub fn build<I>(&self, fragments: I) -> BuildOutput
    where
        I: IntoIterator<Item = CoverageFragment>,
    {
        let mut files: BTreeMap<String, BTreeMap<u32, bool>> = BTreeMap::new();
        let mut rejected = Vec::new();

        for (index, fragment) in fragments.into_iter().enumerate() {
            let file = self.normalize(&fragment.file);
            if let Err(error) = validate(&file, &fragment.lines) {
                warn!(index, file = %fragment.file, %error, "rejecting coverage fragment");
                rejected.push(RejectedFragment {
                    index,
                    file: fragment.file,
                    error,
                });
                continue;
            }

            let lines = files.entry(file).or_default();
            for line in fragment.lines {
                // validated above, so the conversion cannot fail
                let Ok(number) = u32::try_from(line.number) else {
                    continue;
                };
                *lines.entry(number).or_insert(false) |= line.covered;
            }
        }

        // a fragment without lines still names a file; keep the index free of
        // files that contribute nothing
        files.retain(|_, lines| !lines.is_empty());

        debug!(files = files.len(), rejected = rejected.len(), "coverage index built");
        BuildOutput {
            index: CoverageIndex { files },
            rejected,
        }
    }

    fn normalize(&self, file: &str) -> String {
        let file = normalize_path(file);
        for prefix in &self.strip_prefixes {
            let Some(rest) = file.strip_prefix(prefix.as_str()) else {
                continue;
            };
            // whole components only: `/work/proj` must not eat `/work/project2`
            if prefix.ends_with('/') || rest.starts_with('/') {
                let rest = rest.trim_start_matches('/');
                if !rest.is_empty() {
                    return rest.to_string();
                }
            }
        }
        file
    }
}

/// Checks the normalized file name and every line number.
fn validate(file: &str, lines: &[FragmentLine]) -> std::result::Result<(), CoverageDataError> {
    if file.is_empty() {
        return Err(CoverageDataError::EmptyFileName);
    }
    for line in lines {
        if line.number <= 0 {
            return Err(CoverageDataError::NonPositiveLine { line: line.number });
        }
        if line.number > u32::MAX as i64 {
            return Err(CoverageDataError::LineOutOfRange { line: line.number });
        }
    }
    Ok(())
}

/// Forward slashes, no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let mut path = path.trim().replace('\\', "/");
    while let Some(rest) = path.strip_prefix("./") {
        path = rest.to_string();
    }
    path
}

/// Supported report formats.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// Detect from the file name, then the content
    #[default]
    Auto,
    Cobertura,
    Lcov,
}

/// Fragments parsed from one report file.
#[derive(Debug, Clone, Default)]
pub struct CoverageReport {
    pub fragments: Vec<CoverageFragment>,
    /// Source roots declared by the report, if the format has them
    pub sources: Vec<String>,
}

impl CoverageReport {
    /// Rewrites relative file names against the first declared source root
    /// that lies inside `repo_root`, when the name does not already resolve
    /// from the repository root.
    pub fn rebase_sources(&mut self, repo_root: &Path) {
        let roots: Vec<String> = self
            .sources
            .iter()
            .filter_map(|source| {
                let source = Path::new(source.trim());
                let absolute = if source.is_absolute() {
                    source.to_path_buf()
                } else {
                    repo_root.join(source)
                };
                let relative = match absolute.strip_prefix(repo_root) {
                    Ok(rest) => rest.to_path_buf(),
                    // symlinked temp or workspace dirs
                    Err(_) => absolute
                        .canonicalize()
                        .ok()?
                        .strip_prefix(repo_root.canonicalize().ok()?)
                        .ok()?
                        .to_path_buf(),
                };
                let relative = normalize_path(&relative.to_string_lossy());
                (!relative.is_empty()).then_some(relative)
            })
            .collect();
        if roots.is_empty() {
            return;
        }

        for fragment in &mut self.fragments {
            let file = normalize_path(&fragment.file);
            if file.is_empty() || Path::new(&file).is_absolute() || repo_root.join(&file).exists() {
                continue;
            }
            if let Some(root) = roots.iter().find(|root| repo_root.join(root).join(&file).exists()) {
                debug!(from = %fragment.file, root = %root, "rebased onto source root");
                fragment.file = format!("{}/{}", root.trim_end_matches('/'), file);
            }
        }
    }
}

/// Reads and parses one report file.
pub fn load_report(path: &Path, format: ReportFormat) -> Result<CoverageReport> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::CoverageReport {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let format = match format {
        ReportFormat::Auto => detect_format(path, &content),
        explicit => explicit,
    };
    debug!(path = %path.display(), ?format, "parsing coverage report");

    let parsed = match format {
        ReportFormat::Lcov => Ok(lcov::parse(&content)),
        _ => cobertura::parse(&content),
    };
    parsed.map_err(|reason| Error::CoverageReport {
        path: path.to_path_buf(),
        reason,
    })
}

fn detect_format(path: &Path, content: &str) -> ReportFormat {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();

    match ext.as_str() {
        "xml" => return ReportFormat::Cobertura,
        "info" | "lcov" => return ReportFormat::Lcov,
        _ => {}
    }
    if name.starts_with("lcov") {
        return ReportFormat::Lcov;
    }
    if content.trim_start().starts_with('<') {
        ReportFormat::Cobertura
    } else {
        ReportFormat::Lcov
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered(index: &CoverageIndex, file: &str, line: u32) -> Option<bool> {
        index.get(file, line).map(|r| r.covered)
    }

    #[test]
    fn merges_fragments_with_union_semantics() {
        let out = CoverageIndexBuilder::new().build(vec![
            CoverageFragment::with_lines("a.rs", [(1, false), (2, true), (3, false)]),
            CoverageFragment::with_lines("a.rs", [(1, true), (2, false), (4, false)]),
        ]);

        assert!(out.rejected.is_empty());
        assert_eq!(covered(&out.index, "a.rs", 1), Some(true));
        assert_eq!(covered(&out.index, "a.rs", 2), Some(true));
        assert_eq!(covered(&out.index, "a.rs", 3), Some(false));
        assert_eq!(covered(&out.index, "a.rs", 4), Some(false));
        assert_eq!(out.index.line_count(), 4);
    }

    #[test]
    fn rejects_bad_fragments_but_keeps_the_rest() {
        let out = CoverageIndexBuilder::new().build(vec![
            CoverageFragment::with_lines("", [(1, true)]),
            CoverageFragment::with_lines("b.rs", [(0, true), (2, true)]),
            CoverageFragment::with_lines("c.rs", [(-3, false)]),
            CoverageFragment::with_lines("d.rs", [(7, true)]),
        ]);

        assert_eq!(out.rejected.len(), 3);
        assert_eq!(out.rejected[0].index, 0);
        assert_eq!(out.rejected[0].error, CoverageDataError::EmptyFileName);
        assert_eq!(out.rejected[1].file, "b.rs");
        assert_eq!(out.rejected[1].error, CoverageDataError::NonPositiveLine { line: 0 });
        assert_eq!(out.rejected[2].error, CoverageDataError::NonPositiveLine { line: -3 });

        // a rejected fragment contributes nothing, not even its valid lines
        assert_eq!(covered(&out.index, "b.rs", 2), None);
        assert_eq!(covered(&out.index, "d.rs", 7), Some(true));
        assert_eq!(out.index.file_count(), 1);
    }

    #[test]
    fn normalizes_and_strips_prefixes() {
        let out = CoverageIndexBuilder::new()
            .strip_prefix("/home/runner/work/proj/")
            .build(vec![
                CoverageFragment::with_lines("./src\\lib.rs", [(1, true)]),
                CoverageFragment::with_lines("/home/runner/work/proj/src/lib.rs", [(2, false)]),
            ]);

        let files: Vec<&str> = out.index.files().collect();
        assert_eq!(files, vec!["src/lib.rs"]);
        assert_eq!(out.index.line_count(), 2);
    }

    #[test]
    fn prefixes_only_strip_whole_path_components() {
        let out = CoverageIndexBuilder::new().strip_prefix("/work/proj").build(vec![
            CoverageFragment::with_lines("/work/proj/src/a.rs", [(1, true)]),
            CoverageFragment::with_lines("/work/project2/src/a.rs", [(1, false)]),
        ]);

        let files: Vec<&str> = out.index.files().collect();
        assert_eq!(files, vec!["/work/project2/src/a.rs", "src/a.rs"]);
    }

    #[test]
    fn names_that_normalize_to_nothing_are_rejected() {
        let out = CoverageIndexBuilder::new().build(vec![
            CoverageFragment::with_lines("./", [(1, true)]),
            CoverageFragment::with_lines("  ", [(1, true)]),
        ]);

        assert!(out.index.is_empty());
        assert_eq!(out.rejected.len(), 2);
        assert!(out.rejected.iter().all(|r| r.error == CoverageDataError::EmptyFileName));
        assert_eq!(out.rejected[0].file, "./");
    }

    #[test]
    fn line_numbers_beyond_u32_are_rejected() {
        let too_big = i64::from(u32::MAX) + 1;
        let out = CoverageIndexBuilder::new().build(vec![
            CoverageFragment::with_lines("a.rs", [(1, true), (too_big, true)]),
            CoverageFragment::with_lines("b.rs", [(i64::from(u32::MAX), true)]),
        ]);

        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].error, CoverageDataError::LineOutOfRange { line: too_big });
        assert_eq!(out.index.get("a.rs", 1), None);
        assert_eq!(covered(&out.index, "b.rs", u32::MAX), Some(true));
    }

    #[test]
    fn empty_fragments_leave_no_file_behind() {
        let out = CoverageIndexBuilder::new().build(vec![CoverageFragment::new("empty.rs")]);
        assert!(out.index.is_empty());
        assert!(out.rejected.is_empty());
    }

    #[test]
    fn detects_format_from_name_and_content() {
        assert_eq!(detect_format(Path::new("coverage.xml"), ""), ReportFormat::Cobertura);
        assert_eq!(detect_format(Path::new("lcov.info"), ""), ReportFormat::Lcov);
        assert_eq!(detect_format(Path::new("lcov"), ""), ReportFormat::Lcov);
        assert_eq!(detect_format(Path::new("report"), "  <?xml"), ReportFormat::Cobertura);
        assert_eq!(detect_format(Path::new("report"), "SF:a.rs"), ReportFormat::Lcov);
    }

    #[test]
    fn rebases_file_names_onto_in_repo_source_roots() {
        let repo = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(repo.path().join("pkg/src")).unwrap();
        std::fs::write(repo.path().join("pkg/src/lib.rs"), "").unwrap();
        std::fs::write(repo.path().join("top.rs"), "").unwrap();

        let mut report = CoverageReport {
            fragments: vec![
                CoverageFragment::new("lib.rs"),
                CoverageFragment::new("top.rs"),
                CoverageFragment::new("missing.rs"),
            ],
            sources: vec![
                "/somewhere/else".to_string(),
                repo.path().join("pkg/src").to_string_lossy().into_owned(),
            ],
        };
        report.rebase_sources(repo.path());

        let files: Vec<&str> = report.fragments.iter().map(|f| f.file.as_str()).collect();
        assert_eq!(files, vec!["pkg/src/lib.rs", "top.rs", "missing.rs"]);
    }

    #[test]
    fn load_report_names_missing_file() {
        let err = load_report(Path::new("/definitely/not/here.xml"), ReportFormat::Auto).unwrap_err();
        assert_eq!(err.kind(), "CoverageReport");
        assert!(err.to_string().contains("/definitely/not/here.xml"));
    }
}
