use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

pub const DEFAULT_REPO_LABEL: &str = "wix-data-client";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub repo: String,
    pub branch: String,
    pub total_tests: i64,
    pub skipped_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values written by an upsert; timestamps are owned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSummary {
    pub date: NaiveDate,
    pub repo: String,
    pub branch: String,
    pub total_tests: i64,
    pub skipped_count: i64,
}

#[derive(Debug, Clone, Default)]
pub struct SeriesFilter<'a> {
    pub branch: Option<&'a str>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub test_count: usize,
    pub skip_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub relative_path: String,
    pub skip_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ScanResult {
    pub total_tests: usize,
    pub skipped_count: usize,
    pub files_scanned: usize,
    pub skipped_files: Vec<SkippedFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowAverage {
    pub average: Option<f64>,
    pub sample_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Flat => "flat",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub today_skipped: Option<i64>,
    pub today_total: Option<i64>,
    pub avg_7d: Option<f64>,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchOutcome {
    pub date: NaiveDate,
    pub branch: String,
    pub total_tests: i64,
    pub skipped_count: i64,
}
