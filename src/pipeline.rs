//! Snapshot, scan, record.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::db::Store;
use crate::error::{PipelineError, StoreError};
use crate::models::{FetchOutcome, NewSummary, ScanResult};
use crate::report;
use crate::scan::{scan, ScanConfig};
use crate::snapshot::Snapshotter;

pub struct Pipeline<S> {
    snapshotter: S,
    store: Store,
    scan_config: ScanConfig,
    repo_label: String,
    /// One lock per checkout directory; a checkout and its scan run under it.
    checkout_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl<S: Snapshotter> Pipeline<S> {
    pub fn new(snapshotter: S, store: Store, scan_config: ScanConfig, repo_label: String) -> Self {
        Self {
            snapshotter,
            store,
            scan_config,
            repo_label,
            checkout_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, branch: &str) -> Arc<Mutex<()>> {
        let path = self.snapshotter.checkout_path(branch);
        let mut locks = self.checkout_locks.lock().await;
        Arc::clone(locks.entry(path).or_default())
    }

    async fn snapshot_and_scan(&self, branch: &str) -> Result<ScanResult, PipelineError> {
        let lock = self.lock_for(branch).await;
        let _guard = lock.lock().await;

        let checkout = self.snapshotter.ensure_branch(branch).await?;
        let config = self.scan_config.clone();
        let result = tokio::task::spawn_blocking(move || scan(&checkout, &config)).await??;
        Ok(result)
    }

    pub async fn run_fetch(&self, branch: &str) -> Result<FetchOutcome, PipelineError> {
        self.run_fetch_on(branch, Utc::now().date_naive()).await
    }

    /// Fetch and record `branch` under `date`. The upsert is the only write
    /// and happens last.
    pub async fn run_fetch_on(
        &self,
        branch: &str,
        date: NaiveDate,
    ) -> Result<FetchOutcome, PipelineError> {
        info!(repo = %self.repo_label, branch, "fetching skipped test data");
        let result = self.snapshot_and_scan(branch).await?;

        for line in report::scan_summary_lines(date, branch, &result) {
            info!("{line}");
        }

        Ok(record_scan(&self.store, &self.repo_label, branch, date, &result).await?)
    }

    /// Fetch each branch in turn. A failing branch is logged and does not
    /// stop the rest.
    pub async fn run_scheduled(
        &self,
        branches: &[String],
    ) -> Vec<(String, Result<FetchOutcome, PipelineError>)> {
        let mut results = Vec::with_capacity(branches.len());
        for branch in branches {
            let branch = branch.trim();
            if branch.is_empty() {
                continue;
            }
            let outcome = self.run_fetch(branch).await;
            match &outcome {
                Ok(done) => info!(
                    branch,
                    skipped = done.skipped_count,
                    total = done.total_tests,
                    "scheduled fetch complete"
                ),
                Err(e) => error!(branch, error = %e, "scheduled fetch failed"),
            }
            results.push((branch.to_string(), outcome));
        }
        results
    }
}

/// Upsert the counts of a finished scan as the `(date, branch)` summary.
pub async fn record_scan(
    store: &Store,
    repo_label: &str,
    branch: &str,
    date: NaiveDate,
    result: &ScanResult,
) -> Result<FetchOutcome, StoreError> {
    let stored = store
        .upsert(&NewSummary {
            date,
            repo: repo_label.to_string(),
            branch: branch.to_string(),
            total_tests: result.total_tests as i64,
            skipped_count: result.skipped_count as i64,
        })
        .await?;

    info!(branch, date = %stored.date, "stored daily summary");
    Ok(FetchOutcome {
        date: stored.date,
        branch: stored.branch,
        total_tests: stored.total_tests,
        skipped_count: stored.skipped_count,
    })
}
