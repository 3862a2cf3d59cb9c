// src/cli.rs

use crate::config::parse_timestamp;
use crate::coverage::ReportFormat;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

/// Gate a change on per-committer test coverage.
///
/// Every option can also be given through the environment, which is how CI
/// actions pass their inputs.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path inside the git repository to analyze [default: $GITHUB_WORKSPACE or .]
    #[arg(short, long, env = "INPUT_WORKSPACE")]
    pub repo: Option<PathBuf>,

    /// Coverage report files, comma separated
    #[arg(
        short,
        long = "coverage",
        env = "INPUT_FILES",
        value_delimiter = ',',
        default_value = "coverage.xml"
    )]
    pub coverage_files: Vec<PathBuf>,

    /// Coverage report format
    #[arg(long, env = "INPUT_FORMAT", value_enum, default_value_t = ReportFormat::Auto)]
    pub format: ReportFormat,

    /// Minimum coverage percentage, 0 to 100
    #[arg(long, env = "INPUT_MIN_THRESHOLD", default_value_t = 80, allow_negative_numbers = true)]
    pub min_threshold: i64,

    /// Only credit lines changed since the merge-base with this branch
    #[arg(long, env = "INPUT_BASE_BRANCH")]
    pub base_branch: Option<String>,

    /// Only credit lines last changed at or after this time
    #[arg(long, env = "INPUT_FROM_TIMESTAMP", value_parser = parse_timestamp)]
    pub from: Option<DateTime<Utc>>,

    /// Only credit lines last changed at or before this time
    #[arg(long, env = "INPUT_TO_TIMESTAMP", value_parser = parse_timestamp)]
    pub to: Option<DateTime<Utc>>,

    /// Fail when any single committer is below the threshold
    #[arg(long, env = "INPUT_ENFORCE_PER_COMMITTER")]
    pub enforce_per_committer: bool,

    /// Prefix to strip from report file names, repeatable
    #[arg(long = "strip-prefix", env = "INPUT_STRIP_PREFIX", value_delimiter = ',')]
    pub strip_prefixes: Vec<String>,

    /// Number of blame workers [default: one per CPU]
    #[arg(long, env = "INPUT_JOBS")]
    pub jobs: Option<usize>,

    /// Give up on blame after this many seconds
    #[arg(long, env = "INPUT_BLAME_TIMEOUT")]
    pub blame_timeout: Option<u64>,

    /// Report format written to stdout
    #[arg(short, long, env = "INPUT_OUTPUT", value_enum, default_value_t = Output::Text)]
    pub output: Output,

    /// Append a Markdown report to this file
    #[arg(long, env = "GITHUB_STEP_SUMMARY")]
    pub summary_file: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// `--repo`, then `$GITHUB_WORKSPACE`, then the current directory.
    pub fn repo_path(&self) -> PathBuf {
        self.repo
            .clone()
            .or_else(|| {
                std::env::var_os("GITHUB_WORKSPACE")
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum Output {
    /// Plain console table
    Text,
    /// Markdown table, as posted to a CI job summary
    Markdown,
    /// Machine-readable JSON
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_full_command_line() {
        let args = Args::try_parse_from([
            "committer-coverage",
            "--repo",
            "/work",
            "--coverage",
            "a.xml,b.info",
            "--min-threshold",
            "75",
            "--base-branch",
            "main",
            "--from",
            "2024-01-01",
            "--enforce-per-committer",
            "--strip-prefix",
            "/build/",
            "--jobs",
            "4",
            "-o",
            "json",
        ])
        .unwrap();

        assert_eq!(args.repo_path(), PathBuf::from("/work"));
        assert_eq!(args.coverage_files, vec![PathBuf::from("a.xml"), PathBuf::from("b.info")]);
        assert_eq!(args.min_threshold, 75);
        assert_eq!(args.base_branch.as_deref(), Some("main"));
        assert!(args.from.is_some());
        assert!(args.to.is_none());
        assert!(args.enforce_per_committer);
        assert_eq!(args.strip_prefixes, vec!["/build/".to_string()]);
        assert_eq!(args.jobs, Some(4));
        assert_eq!(args.output, Output::Json);
    }

    #[test]
    fn out_of_range_threshold_parses_and_is_rejected_later() {
        let args = Args::try_parse_from(["committer-coverage", "--min-threshold", "-5"]).unwrap();
        assert_eq!(args.min_threshold, -5);
    }

    #[test]
    fn rejects_bad_timestamps() {
        assert!(Args::try_parse_from(["committer-coverage", "--to", "soon"]).is_err());
    }
}
