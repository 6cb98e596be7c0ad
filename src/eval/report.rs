//! Console and log-file rendering of score reports.

use super::{Metric, ScoreReport};
use crate::db::Dialect;
use crate::error::{EvalError, Result};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;
use tracing::{info, warn};

const LEVELS: [&str; 4] = ["simple", "moderate", "challenging", "total"];

const RULE: &str =
    "===========================================================================================";

fn metric_banner(metric: Metric) -> String {
    format!(
        "======================================    {}    =====================================",
        metric.label()
    )
}

/// Renders the fixed-width count and score table.
pub fn render_table(report: &ScoreReport, metric: Metric) -> String {
    let counts = report.counts();
    let scores = report.scores();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{:20} {:20} {:20} {:20} {:20}",
        "", LEVELS[0], LEVELS[1], LEVELS[2], LEVELS[3]
    );
    let _ = writeln!(
        out,
        "{:20} {:<20} {:<20} {:<20} {:<20}",
        "count", counts[0], counts[1], counts[2], counts[3]
    );
    let _ = writeln!(out, "{}", metric_banner(metric));
    let _ = writeln!(
        out,
        "{:20} {:<20.2} {:<20.2} {:<20.2} {:<20.2}",
        metric.label(),
        scores[0],
        scores[1],
        scores[2],
        scores[3]
    );
    out
}

/// Line closing a run, naming the metric and dialect.
pub fn finished_line(metric: Metric, dialect: Dialect) -> String {
    format!(
        "Finished {} evaluation for {} on Mini Dev set",
        metric.label(),
        dialect
    )
}

/// Renders one log-file entry: header line, table, closing lines.
pub fn render_log_entry(report: &ScoreReport, metric: Metric, dialect: Dialect) -> String {
    let mut out = format!("start calculate {}\n", metric.label());
    out.push_str(&render_table(report, metric));
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&finished_line(metric, dialect));
    out.push_str("\n\n");
    out
}

/// Appends `entry` to the log file, creating it if needed.
pub fn append_log(path: &Path, entry: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| EvalError::io(format!("Cannot open log file {}: {e}", path.display())))?;
    file.write_all(entry.as_bytes())
        .map_err(|e| EvalError::io(format!("Cannot write log file {}: {e}", path.display())))
}

/// Prints the report to stdout and appends it to `log_path` if given.
///
/// A log file that cannot be written only produces a warning.
pub fn print_report(
    report: &ScoreReport,
    metric: Metric,
    dialect: Dialect,
    log_path: Option<&Path>,
) {
    print!("{}", render_table(report, metric));
    println!("{RULE}");
    println!("{}", finished_line(metric, dialect));
    println!("\n");

    if let Some(path) = log_path {
        match append_log(path, &render_log_entry(report, metric, dialect)) {
            Ok(()) => info!("Appended results to {}", path.display()),
            Err(e) => warn!("{e}"),
        }
    }
}
