//! Plain-text rendering of a finished run for the terminal.

use std::fmt::Write;

use rater_core::{Outcome, RatingResult};
use rater_engine::{RunReport, StopReason};

const ID_WIDTH: usize = 32;

pub fn render(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "batch {} {}", report.job.id, report.job.progress_line());

    let Some(reconciliation) = &report.reconciliation else {
        let reason = match report.stop {
            StopReason::Cancelled => "interrupted",
            StopReason::DeadlineExceeded => "wait limit reached",
            StopReason::Terminal => "finished without reconciliation",
        };
        let _ = writeln!(out, "{reason}; resume with --resume {}", report.job.id);
        return out;
    };

    for artifact in [&report.downloads.output, &report.downloads.errors]
        .into_iter()
        .flatten()
    {
        let _ = writeln!(
            out,
            "saved {} ({} lines)",
            artifact.path.display(),
            artifact.line_count
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{:<ID_WIDTH$}  {:<8}  detail", "custom_id", "outcome");
    for result in &reconciliation.results {
        let _ = writeln!(
            out,
            "{:<ID_WIDTH$}  {:<8}  {}",
            result.custom_id,
            result.outcome.to_string(),
            detail(result)
        );
    }

    let summary = reconciliation.summary();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "total={} succeeded={} failed={} invalid={} missing={} anomalies={}",
        summary.total,
        summary.succeeded,
        summary.failed,
        summary.invalid,
        summary.missing,
        summary.anomalies
    );
    for anomaly in &reconciliation.anomalies {
        let _ = writeln!(out, "anomaly: {anomaly}");
    }
    out
}

fn detail(result: &RatingResult) -> String {
    match result.outcome {
        Outcome::Success => result
            .scores
            .iter()
            .map(|(dimension, score)| format!("{dimension}={score}"))
            .collect::<Vec<_>>()
            .join(" "),
        Outcome::Failed | Outcome::Missing => result.error.clone().unwrap_or_default(),
    }
}
