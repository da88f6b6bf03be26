use std::str::FromStr;
use std::time::Duration;

use chrono::{Duration as Days, NaiveDate, Utc};
use rand::Rng;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{DailySummary, NewSummary, SeriesFilter, WindowAverage};

const SUMMARY_COLUMNS: &str =
    "date, repo, branch, total_tests, skipped_count, created_at, updated_at";

/// Handle to the daily summary table. Construct once, call [`Store::init`],
/// and pass by reference; [`Store::close`] drains the pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        debug!(database_url, "connected to summary store");
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Create or upgrade the schema.
    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Insert the row for `(date, branch)` or overwrite its counts and repo.
    /// `created_at` survives updates.
    pub async fn upsert(&self, summary: &NewSummary) -> Result<DailySummary, StoreError> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO daily_skipped_summary
            (date, repo, branch, total_tests, skipped_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (date, branch) DO UPDATE
            SET repo = excluded.repo,
                total_tests = excluded.total_tests,
                skipped_count = excluded.skipped_count,
                updated_at = excluded.updated_at
            RETURNING {SUMMARY_COLUMNS}
            "#
        ))
        .bind(summary.date)
        .bind(&summary.repo)
        .bind(&summary.branch)
        .bind(summary.total_tests)
        .bind(summary.skipped_count)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(summary_from_row(&row)?)
    }

    pub async fn time_series(
        &self,
        filter: &SeriesFilter<'_>,
    ) -> Result<Vec<DailySummary>, StoreError> {
        let mut query = format!("SELECT {SUMMARY_COLUMNS} FROM daily_skipped_summary WHERE 1=1");

        if filter.branch.is_some() {
            query.push_str(" AND branch = ?");
        }
        if filter.from.is_some() {
            query.push_str(" AND date >= ?");
        }
        if filter.to.is_some() {
            query.push_str(" AND date <= ?");
        }
        query.push_str(" ORDER BY date ASC, branch ASC");

        let mut rows = sqlx::query(&query);
        if let Some(branch) = filter.branch {
            rows = rows.bind(branch);
        }
        if let Some(from) = filter.from {
            rows = rows.bind(from);
        }
        if let Some(to) = filter.to {
            rows = rows.bind(to);
        }

        let records = rows.fetch_all(&self.pool).await?;
        let mut series = Vec::with_capacity(records.len());
        for row in records {
            series.push(summary_from_row(&row)?);
        }
        Ok(series)
    }

    pub async fn distinct_branches(&self) -> Result<Vec<String>, StoreError> {
        let branches = sqlx::query("SELECT DISTINCT branch FROM daily_skipped_summary ORDER BY branch")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.try_get("branch"))
            .collect::<Result<Vec<String>, _>>()?;
        Ok(branches)
    }

    pub async fn summary_for_date(
        &self,
        date: NaiveDate,
        branch: Option<&str>,
    ) -> Result<Option<DailySummary>, StoreError> {
        let mut query = format!("SELECT {SUMMARY_COLUMNS} FROM daily_skipped_summary WHERE date = ?");
        if branch.is_some() {
            query.push_str(" AND branch = ?");
        }
        query.push_str(" ORDER BY branch ASC LIMIT 1");

        let mut row = sqlx::query(&query).bind(date);
        if let Some(branch) = branch {
            row = row.bind(branch);
        }

        match row.fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(summary_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Mean `skipped_count` over `[from, to]`. `average` is `None` when no
    /// rows fall in the window.
    pub async fn average_skipped(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        branch: Option<&str>,
    ) -> Result<WindowAverage, StoreError> {
        let mut query = String::from(
            "SELECT AVG(skipped_count) AS avg_skipped, COUNT(*) AS days \
             FROM daily_skipped_summary WHERE date >= ? AND date <= ?",
        );
        if branch.is_some() {
            query.push_str(" AND branch = ?");
        }

        let mut row = sqlx::query(&query).bind(from).bind(to);
        if let Some(branch) = branch {
            row = row.bind(branch);
        }

        let row = row.fetch_one(&self.pool).await?;
        let sample_days: i64 = row.try_get("days")?;
        let average: Option<f64> = row.try_get("avg_skipped")?;
        Ok(WindowAverage {
            average: if sample_days == 0 { None } else { average },
            sample_days,
        })
    }

    /// Load 30 days of random-walk history for `master` and `develop`.
    pub async fn seed(&self, repo: &str, today: NaiveDate) -> Result<usize, StoreError> {
        let rows = seed_rows(repo, today, &mut rand::thread_rng());
        for row in &rows {
            self.upsert(row).await?;
        }
        info!(rows = rows.len(), "seeded summary history");
        Ok(rows.len())
    }
}

const SEED_DAYS: i64 = 30;
const SEED_BRANCHES: [(&str, i64); 2] = [("master", 38), ("develop", 45)];
const SEED_BASE_TOTAL: i64 = 4500;

fn seed_rows(repo: &str, today: NaiveDate, rng: &mut impl Rng) -> Vec<NewSummary> {
    let mut rows = Vec::new();
    for (branch, base_skipped) in SEED_BRANCHES {
        let mut skipped = base_skipped;
        let mut total = SEED_BASE_TOTAL;

        for days_ago in (0..SEED_DAYS).rev() {
            total = random_step(total, 20.0, rng);
            skipped = random_step(skipped, 4.0, rng);
            rows.push(NewSummary {
                date: today - Days::days(days_ago),
                repo: repo.to_string(),
                branch: branch.to_string(),
                total_tests: total,
                skipped_count: skipped,
            });
        }
    }
    rows
}

/// Drifts slightly upward on average and never goes below zero.
fn random_step(value: i64, max_delta: f64, rng: &mut impl Rng) -> i64 {
    let delta = ((rng.gen::<f64>() - 0.45) * max_delta).round() as i64;
    (value + delta).max(0)
}

fn summary_from_row(row: &SqliteRow) -> Result<DailySummary, sqlx::Error> {
    Ok(DailySummary {
        date: row.try_get("date")?,
        repo: row.try_get("repo")?,
        branch: row.try_get("branch")?,
        total_tests: row.try_get("total_tests")?,
        skipped_count: row.try_get("skipped_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
