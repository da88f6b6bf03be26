use chrono::{Duration, NaiveDate, Utc};

use crate::db::Store;
use crate::error::StoreError;
use crate::models::{Trend, TrendSummary, WindowAverage};

pub const WINDOW_DAYS: i64 = 7;
pub const MIN_SAMPLE_DAYS: i64 = 2;
pub const DEFAULT_THRESHOLD: f64 = 1.0;

/// Noise margin: averages must move by more than `threshold` skipped tests
/// before the trend leaves `flat`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendConfig {
    pub threshold: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// `(from, to)` of the window ending on `today` and the one before it.
pub fn windows(today: NaiveDate) -> ((NaiveDate, NaiveDate), (NaiveDate, NaiveDate)) {
    let last_from = today - Duration::days(WINDOW_DAYS - 1);
    let prev_to = last_from - Duration::days(1);
    let prev_from = prev_to - Duration::days(WINDOW_DAYS - 1);
    ((last_from, today), (prev_from, prev_to))
}

pub fn classify_trend(last: &WindowAverage, prev: &WindowAverage, config: &TrendConfig) -> Trend {
    if last.sample_days < MIN_SAMPLE_DAYS || prev.sample_days < MIN_SAMPLE_DAYS {
        return Trend::Flat;
    }

    let (Some(last_avg), Some(prev_avg)) = (last.average, prev.average) else {
        return Trend::Flat;
    };

    let delta = last_avg - prev_avg;
    if delta > config.threshold {
        Trend::Up
    } else if delta < -config.threshold {
        Trend::Down
    } else {
        Trend::Flat
    }
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub async fn compute_trend(
    store: &Store,
    branch: Option<&str>,
    config: &TrendConfig,
) -> Result<TrendSummary, StoreError> {
    compute_trend_at(store, branch, config, Utc::now().date_naive()).await
}

pub async fn compute_trend_at(
    store: &Store,
    branch: Option<&str>,
    config: &TrendConfig,
    today: NaiveDate,
) -> Result<TrendSummary, StoreError> {
    let ((last_from, last_to), (prev_from, prev_to)) = windows(today);

    let current = store.summary_for_date(today, branch).await?;
    let last = store.average_skipped(last_from, last_to, branch).await?;
    let prev = store.average_skipped(prev_from, prev_to, branch).await?;

    Ok(TrendSummary {
        today_skipped: current.as_ref().map(|row| row.skipped_count),
        today_total: current.as_ref().map(|row| row.total_tests),
        avg_7d: last.average.map(round_one_decimal),
        trend: classify_trend(&last, &prev, config),
    })
}
