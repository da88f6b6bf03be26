//! Externally computed summaries: the webhook payload and CSV imports.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::Context;
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::db::Store;
use crate::error::{IngestError, ValidationError};
use crate::models::NewSummary;

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid"))
}

/// Loosely typed summary as received; `None` means missing or of the wrong type.
#[derive(Debug, Clone, Default)]
pub struct SummaryInput {
    pub date: Option<String>,
    pub branch: Option<String>,
    pub total_tests: Option<f64>,
    pub skipped_count: Option<f64>,
    pub repo: Option<String>,
}

impl SummaryInput {
    pub fn from_json(payload: &Value) -> Self {
        let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);
        let number = |key: &str| payload.get(key).and_then(Value::as_f64);
        Self {
            date: text("date"),
            branch: text("branch"),
            total_tests: number("total_tests"),
            skipped_count: number("skipped_count"),
            repo: text("repo"),
        }
    }

    /// Check every field and report all problems at once.
    pub fn validate(&self, default_repo: &str) -> Result<NewSummary, ValidationError> {
        let mut details = Vec::new();

        let date = match self.date.as_deref() {
            Some(raw) if date_regex().is_match(raw) => {
                match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                    Ok(date) => Some(date),
                    Err(_) => {
                        details.push("date must be a valid calendar day".to_string());
                        None
                    }
                }
            }
            _ => {
                details.push("date is required (YYYY-MM-DD)".to_string());
                None
            }
        };

        let branch = match self.branch.as_deref() {
            Some(branch) if !branch.is_empty() => Some(branch.to_string()),
            _ => {
                details.push("branch is required".to_string());
                None
            }
        };

        let total_tests = count_field("total_tests", self.total_tests, &mut details);
        let skipped_count = count_field("skipped_count", self.skipped_count, &mut details);

        match (date, branch, total_tests, skipped_count) {
            (Some(date), Some(branch), Some(total_tests), Some(skipped_count))
                if details.is_empty() =>
            {
                Ok(NewSummary {
                    date,
                    repo: self
                        .repo
                        .clone()
                        .filter(|repo| !repo.is_empty())
                        .unwrap_or_else(|| default_repo.to_string()),
                    branch,
                    total_tests,
                    skipped_count,
                })
            }
            _ => Err(ValidationError { details }),
        }
    }
}

fn count_field(name: &str, value: Option<f64>, details: &mut Vec<String>) -> Option<i64> {
    match value {
        Some(value) if value.is_finite() && value >= 0.0 => {
            if value.fract() != 0.0 {
                details.push(format!("{name} must be a whole number"));
                None
            } else if value >= i64::MAX as f64 {
                details.push(format!("{name} is too large"));
                None
            } else {
                Some(value as i64)
            }
        }
        _ => {
            details.push(format!("{name} must be a non-negative number"));
            None
        }
    }
}

/// Validate a webhook payload and upsert it.
pub async fn ingest_payload(
    store: &Store,
    payload: &Value,
    default_repo: &str,
) -> Result<NewSummary, IngestError> {
    let summary = SummaryInput::from_json(payload).validate(default_repo)?;
    store.upsert(&summary).await?;
    debug!(date = %summary.date, branch = %summary.branch, "ingested summary");
    Ok(summary)
}

/// Upsert every row of a CSV with `date,branch,total_tests,skipped_count[,repo]`
/// headers. The first invalid row aborts the import.
pub async fn import_csv(store: &Store, csv_path: &Path, default_repo: &str) -> anyhow::Result<usize> {
    #[derive(Deserialize)]
    struct CsvRow {
        date: Option<String>,
        branch: Option<String>,
        total_tests: Option<String>,
        skipped_count: Option<String>,
        repo: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut imported = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed CSV row at line {line}"))?;
        let input = SummaryInput {
            date: row.date,
            branch: row.branch,
            total_tests: row.total_tests.and_then(|v| v.trim().parse().ok()),
            skipped_count: row.skipped_count.and_then(|v| v.trim().parse().ok()),
            repo: row.repo,
        };
        let summary = input
            .validate(default_repo)
            .with_context(|| format!("invalid CSV row at line {line}"))?;

        store.upsert(&summary).await?;
        imported += 1;
    }

    Ok(imported)
}
