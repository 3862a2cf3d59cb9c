// src/renderer.rs

use crate::cli::Output;
use crate::error::Result;
use crate::gate::GateResult;
use crate::model::CommitterStats;
use crate::pipeline::RunOutcome;
use std::fmt::Write;

pub fn render(outcome: &RunOutcome, output: Output) -> Result<String> {
    match output {
        Output::Text => Ok(render_text(outcome)),
        Output::Markdown => Ok(render_markdown(outcome)),
        Output::Json => Ok(serde_json::to_string_pretty(outcome)? + "\n"),
    }
}

pub fn render_text(outcome: &RunOutcome) -> String {
    let gate = &outcome.gate;
    let mut out = String::new();

    let _ = writeln!(out, "Committer coverage: {} (threshold {}%)", gate.verdict, gate.threshold);
    let _ = writeln!(out, "{}", headline(gate));
    let _ = writeln!(
        out,
        "Project coverage: {} / {} ({:.2}%)",
        outcome.attribution.covered_lines, outcome.attribution.total_lines, gate.project_percentage
    );
    if gate.enforce_per_committer {
        let _ = writeln!(out, "Per-committer enforcement: on");
    }
    out.push('\n');

    let width = gate
        .per_committer
        .iter()
        .chain(gate.unattributed.iter())
        .map(|c| c.identity.len())
        .max()
        .unwrap_or(0)
        .max("COMMITTER".len());

    let _ = writeln!(out, "  {:<width$}  {:>7}  {:>7}  {:>8}", "COMMITTER", "LINES", "COVERED", "%");
    for stat in &gate.per_committer {
        let mark = if gate.violating_committers.contains(&stat.identity) {
            "✗"
        } else {
            "✓"
        };
        let _ = writeln!(out, "{} {}", mark, text_row(stat, width));
    }
    if let Some(stat) = &gate.unattributed {
        let _ = writeln!(out, "  {}", text_row(stat, width));
    }

    for (file, reason) in &outcome.files_without_history {
        let _ = writeln!(out, "warning: {}: {}", file, reason);
    }
    for rejected in &outcome.rejected_fragments {
        let _ = writeln!(
            out,
            "warning: coverage fragment #{} ({}) rejected: {}",
            rejected.index, rejected.file, rejected.error
        );
    }
    out
}

fn text_row(stat: &CommitterStats, width: usize) -> String {
    format!(
        "{:<width$}  {:>7}  {:>7}  {:>7.2}%",
        stat.identity, stat.total_lines, stat.covered_lines, stat.percentage
    )
}

pub fn render_markdown(outcome: &RunOutcome) -> String {
    let gate = &outcome.gate;
    let mut out = String::new();

    let status = if gate.passed { "✅" } else { "❌" };
    let _ = writeln!(out, "# Committer Coverage Report\n");
    let _ = writeln!(out, "{} **{}** (minimum {}%)\n", status, gate.verdict, gate.threshold);
    let _ = writeln!(out, "{}  ", headline(gate));
    let _ = writeln!(
        out,
        "Project coverage: {} / {} ({:.2}%)\n",
        outcome.attribution.covered_lines, outcome.attribution.total_lines, gate.project_percentage
    );

    let _ = writeln!(out, "|  | **Committer** | **Lines** | **Covered** | **% Covered** |");
    let _ = writeln!(out, "|--|---------------|----------:|------------:|--------------:|");
    for stat in &gate.per_committer {
        let mark = if stat.meets(gate.threshold.value()) { "✅" } else { "❌" };
        let _ = writeln!(out, "| {} | {} |", mark, markdown_row(stat));
    }
    if let Some(stat) = &gate.unattributed {
        let _ = writeln!(out, "| ➖ | {} |", markdown_row(stat));
    }

    if !outcome.rejected_fragments.is_empty() || !outcome.files_without_history.is_empty() {
        let _ = writeln!(out, "\n<details><summary>Warnings</summary>\n");
        for (file, reason) in &outcome.files_without_history {
            let _ = writeln!(out, "- `{}`: {}", file, reason);
        }
        for rejected in &outcome.rejected_fragments {
            let _ = writeln!(out, "- fragment #{} `{}`: {}", rejected.index, rejected.file, rejected.error);
        }
        let _ = writeln!(out, "\n</details>");
    }
    out
}

fn markdown_row(stat: &CommitterStats) -> String {
    let who = match &stat.name {
        Some(name) => format!("{} &lt;{}&gt;", escape_markdown(name), escape_markdown(&stat.identity)),
        None => escape_markdown(&stat.identity),
    };
    format!(
        "{} | {} | {} | {:.2}",
        who, stat.total_lines, stat.covered_lines, stat.percentage
    )
}

fn headline(gate: &GateResult) -> String {
    if gate.is_vacuous() {
        "Attributed coverage: no attributed lines, nothing to judge".to_string()
    } else {
        format!(
            "Attributed coverage: {} / {} ({:.2}%)",
            gate.attributed_covered_lines, gate.attributed_lines, gate.overall_percentage
        )
    }
}

fn escape_markdown(s: &str) -> String {
    s.replace('|', "\\|").replace('<', "&lt;").replace('>', "&gt;")
}
