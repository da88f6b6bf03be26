use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveTime;

use crate::models::DEFAULT_REPO_LABEL;
use crate::schedule::parse_time_of_day;
use crate::snapshot::{CheckoutLayout, DEFAULT_REMOTE_BASE};
use crate::trend::DEFAULT_THRESHOLD;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/skipped-tests.db";
pub const DEFAULT_REPO: &str = "wix-private/wix-data-client";

/// Process configuration, read once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// GitHub `owner/name` of the tracked repository.
    pub repo: String,
    /// Host `repo` is fetched from.
    pub remote_base: String,
    /// Label stored with each summary.
    pub repo_label: String,
    pub cache_dir: PathBuf,
    pub gh_token: Option<String>,
    pub fetch_branches: Vec<String>,
    pub fetch_at: NaiveTime,
    pub git_timeout: Duration,
    pub checkout_layout: CheckoutLayout,
    pub trend_threshold: f64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let fetch_at = match get("FETCH_AT") {
            Some(value) => parse_time_of_day(&value).context("FETCH_AT must be HH:MM")?,
            None => NaiveTime::from_hms_opt(6, 0, 0).context("invalid default fetch time")?,
        };

        let git_timeout = match get("GIT_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(
                value
                    .trim()
                    .parse()
                    .context("GIT_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            None => Duration::from_secs(300),
        };

        let checkout_layout = match get("CHECKOUT_LAYOUT") {
            Some(value) => value
                .trim()
                .parse::<CheckoutLayout>()
                .map_err(anyhow::Error::msg)
                .context("CHECKOUT_LAYOUT must be `shared` or `per-branch`")?,
            None => CheckoutLayout::default(),
        };

        let trend_threshold = match get("TREND_THRESHOLD") {
            Some(value) => value
                .trim()
                .parse()
                .context("TREND_THRESHOLD must be a number")?,
            None => DEFAULT_THRESHOLD,
        };

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            repo: get("REPO").unwrap_or_else(|| DEFAULT_REPO.to_string()),
            remote_base: get("GIT_REMOTE_BASE").unwrap_or_else(|| DEFAULT_REMOTE_BASE.to_string()),
            repo_label: get("REPO_LABEL").unwrap_or_else(|| DEFAULT_REPO_LABEL.to_string()),
            cache_dir: get("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".cache")),
            gh_token: get("GH_TOKEN"),
            fetch_branches: split_branches(
                &get("FETCH_BRANCHES").unwrap_or_else(|| "master".to_string()),
            ),
            fetch_at,
            git_timeout,
            checkout_layout,
            trend_threshold,
        })
    }
}

pub fn split_branches(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|branch| !branch.is_empty())
        .map(str::to_string)
        .collect()
}
