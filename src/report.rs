use std::fmt::Write;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::models::{DailySummary, ScanResult, TrendSummary};

const TOP_SKIPPED_FILES: usize = 15;

/// Operator-facing summary of a single scan.
pub fn scan_summary_lines(date: NaiveDate, branch: &str, result: &ScanResult) -> Vec<String> {
    let mut lines = vec![
        format!("Date:             {date}"),
        format!("Branch:           {branch}"),
        format!("Files scanned:    {}", result.files_scanned),
        format!("Total tests:      {}", result.total_tests),
        format!("Skipped/flaky:    {}", result.skipped_count),
        format!("Files with skips: {}", result.skipped_files.len()),
    ];

    if !result.skipped_files.is_empty() {
        lines.push("Top files with skips:".to_string());
        for file in result.skipped_files.iter().take(TOP_SKIPPED_FILES) {
            lines.push(format!("  {}x  {}", file.skip_count, file.relative_path));
        }
    }
    lines
}

pub fn build_report(
    branch: Option<&str>,
    cutoff: NaiveDate,
    series: &[DailySummary],
    trend: &TrendSummary,
) -> String {
    let mut output = String::new();
    let branch_label = branch.unwrap_or("all branches");

    let _ = writeln!(output, "# Skipped Tests Report");
    let _ = writeln!(output, "Generated for {} (history since {})", branch_label, cutoff);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Current Trend");

    match (trend.today_skipped, trend.today_total) {
        (Some(skipped), Some(total)) => {
            let _ = writeln!(output, "- Today: {} skipped of {} tests", skipped, total);
        }
        _ => {
            let _ = writeln!(output, "- Today: no data recorded yet");
        }
    }
    match trend.avg_7d {
        Some(avg) => {
            let _ = writeln!(output, "- 7-day average skipped: {:.1}", avg);
        }
        None => {
            let _ = writeln!(output, "- 7-day average skipped: n/a");
        }
    }
    let _ = writeln!(output, "- Trend: {}", trend.trend);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily History");

    if series.is_empty() {
        let _ = writeln!(output, "No summaries recorded for this window.");
    } else {
        let _ = writeln!(output, "| Date | Branch | Skipped | Total | Skipped % |");
        let _ = writeln!(output, "|------|--------|---------|-------|-----------|");
        for row in series.iter().rev() {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {:.1}% |",
                row.date,
                row.branch,
                row.skipped_count,
                row.total_tests,
                skipped_percent(row)
            );
        }
    }

    output
}

fn skipped_percent(row: &DailySummary) -> f64 {
    if row.total_tests == 0 {
        0.0
    } else {
        row.skipped_count as f64 * 100.0 / row.total_tests as f64
    }
}

#[derive(Debug, Serialize)]
pub struct ExportEntry<'a> {
    pub date: NaiveDate,
    pub branch: &'a str,
    pub total_tests: i64,
    pub skipped_count: i64,
}

/// The `data.json` document consumed by the static dashboard.
#[derive(Debug, Serialize)]
pub struct Export<'a> {
    pub repo: &'a str,
    pub updated_at: String,
    pub entries: Vec<ExportEntry<'a>>,
}

pub fn build_export<'a>(repo: &'a str, series: &'a [DailySummary]) -> Export<'a> {
    Export {
        repo,
        updated_at: Utc::now().to_rfc3339(),
        entries: series
            .iter()
            .map(|row| ExportEntry {
                date: row.date,
                branch: &row.branch,
                total_tests: row.total_tests,
                skipped_count: row.skipped_count,
            })
            .collect(),
    }
}
