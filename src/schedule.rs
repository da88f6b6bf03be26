//! Daily trigger for the fetch pipeline.

use std::future::Future;

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use tracing::{info, warn};

use crate::pipeline::Pipeline;
use crate::snapshot::Snapshotter;

pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// First occurrence of `at` strictly after `now`.
pub fn next_run<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> Option<DateTime<Tz>> {
    let timezone = now.timezone();
    let today = now.date_naive();
    // Skip a day whose `at` falls in a DST gap.
    (0..=2).find_map(|offset| {
        let candidate = timezone
            .from_local_datetime(&(today + Duration::days(offset)).and_time(at))
            .earliest()?;
        (candidate > *now).then_some(candidate)
    })
}

/// Run every branch once per day at `at` (local time) until Ctrl-C.
pub async fn run_daily<S: Snapshotter>(
    pipeline: &Pipeline<S>,
    branches: &[String],
    at: NaiveTime,
    run_now: bool,
) -> anyhow::Result<()> {
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    run_daily_until(pipeline, branches, at, run_now, shutdown).await
}

/// Like [`run_daily`], stopping when `shutdown` resolves. A run in progress
/// is abandoned; its summary is only written if the run got that far.
pub async fn run_daily_until<S, F>(
    pipeline: &Pipeline<S>,
    branches: &[String],
    at: NaiveTime,
    run_now: bool,
    shutdown: F,
) -> anyhow::Result<()>
where
    S: Snapshotter,
    F: Future<Output = ()>,
{
    info!(
        at = %at.format("%H:%M"),
        branches = %branches.join(", "),
        "daily fetch scheduled"
    );
    tokio::pin!(shutdown);

    let mut due = run_now;
    loop {
        if due {
            info!("daily fetch triggered");
            tokio::select! {
                _ = pipeline.run_scheduled(branches) => {}
                _ = &mut shutdown => {
                    warn!("interrupted during fetch, stopping scheduler");
                    return Ok(());
                }
            }
        }

        let now = Local::now();
        let next = next_run(&now, at)
            .ok_or_else(|| anyhow::anyhow!("no valid local time for {at} in the next days"))?;
        let wait = (next.clone() - now).to_std().unwrap_or_default();
        info!(next = %next.to_rfc3339(), "waiting for next scheduled fetch");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = &mut shutdown => {
                warn!("interrupted, stopping scheduler");
                return Ok(());
            }
        }
        due = true;
    }
}
