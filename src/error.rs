use std::path::PathBuf;

use thiserror::Error;

/// Failures while walking or reading a checkout.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A file or directory could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal failed part way through
    #[error("failed to walk checkout: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Failures while cloning or updating the tracked repository.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Git command not found
    #[error("git command not found, please install git")]
    GitNotFound,

    /// Branch names are passed to git as arguments and must not look like options
    #[error("invalid branch name: {0:?}")]
    InvalidBranch(String),

    /// The requested branch does not exist upstream
    #[error("branch not found upstream: {0}")]
    BranchNotFound(String),

    /// Credentials were missing or rejected
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Git exited unsuccessfully
    #[error("git {command} failed: {message}")]
    CommandFailed { command: String, message: String },

    /// Git did not finish within the configured bound
    #[error("git {command} timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    /// Local filesystem error around the checkout directory
    #[error("checkout directory error: {0}")]
    Io(#[from] std::io::Error),
}

/// Field-level problems with an externally supplied summary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {}", .details.join("; "))]
pub struct ValidationError {
    pub details: Vec<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A single fetch-and-record run failed; nothing was written.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("scan task did not complete: {0}")]
    Interrupted(#[from] tokio::task::JoinError),
}
