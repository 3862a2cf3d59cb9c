// src/main.rs

use clap::Parser;
use committer_coverage::cli::{Args, Output};
use committer_coverage::config::GatingConfig;
use committer_coverage::coverage::load_report;
use committer_coverage::git::GitHistory;
use committer_coverage::pipeline::{self, RunOptions, RunOutcome};
use committer_coverage::{renderer, Result};
use indicatif::ProgressBar;
use std::io::Write;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
        .init();

    let start_time = Instant::now();
    match run(&args) {
        Ok(outcome) => {
            info!(elapsed = ?start_time.elapsed(), verdict = %outcome.gate.verdict, "done");
            if outcome.gate.passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            eprintln!("error[{}]: {}", e.kind(), e);
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> Result<RunOutcome> {
    let config = GatingConfig::try_from(args)?;
    let history = GitHistory::open(&args.repo_path())?;
    info!(repo = %history.workdir().display(), head = %history.head(), "opened repository");

    let mut fragments = Vec::new();
    for path in &args.coverage_files {
        let mut report = load_report(path, args.format)?;
        report.rebase_sources(history.workdir());
        info!(path = %path.display(), fragments = report.fragments.len(), "loaded coverage report");
        fragments.extend(report.fragments);
    }

    let options = RunOptions {
        strip_prefixes: args.strip_prefixes.clone(),
        jobs: args.jobs,
        blame_timeout: args.blame_timeout.map(Duration::from_secs),
        progress: Some(ProgressBar::new(0)),
        ..RunOptions::default()
    };

    let outcome = pipeline::run(fragments, &history, &config, &options)?;

    let rendered = renderer::render(&outcome, args.output)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    stdout.flush()?;

    if let Some(summary_file) = &args.summary_file {
        let markdown = match args.output {
            Output::Markdown => rendered,
            _ => renderer::render(&outcome, Output::Markdown)?,
        };
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(summary_file)?;
        writeln!(file, "{}", markdown)?;
        info!(path = %summary_file.display(), "appended job summary");
    }

    Ok(outcome)
}
