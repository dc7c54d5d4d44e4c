//! Periodic refresh of stale cache entries

use std::sync::Arc;
use std::time::Duration;

use rabdap_common::config::RefreshConfig;
use rabdap_common::{time, IdField};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::refresh::{RefreshPipeline, RefreshReport};
use crate::db::SelectionFilter;
use crate::error::SyncResult;

/// Refresh entries last updated more than `stale_after_days` ago, by bruid
pub async fn refresh_stale(
    pipeline: &RefreshPipeline,
    stale_after_days: u32,
) -> SyncResult<RefreshReport> {
    let cutoff = time::days_ago(stale_after_days);
    pipeline
        .regenerate(&SelectionFilter::UpdatedBefore(cutoff), IdField::Bruid)
        .await
}

/// Start the background refresh task
///
/// Returns `None` when `interval_secs` is 0. The first run happens one
/// full interval after startup; a failed run is logged and the schedule
/// continues.
pub fn spawn_refresh_scheduler(
    pipeline: Arc<RefreshPipeline>,
    config: &RefreshConfig,
) -> Option<JoinHandle<()>> {
    if config.interval_secs == 0 {
        info!("Scheduled refresh disabled");
        return None;
    }

    let period = Duration::from_secs(config.interval_secs);
    let stale_after_days = config.stale_after_days;

    info!(
        interval_secs = config.interval_secs,
        stale_after_days, "Scheduled refresh enabled"
    );

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match refresh_stale(&pipeline, stale_after_days).await {
                Ok(report) => info!(refreshed = report.len(), "Scheduled refresh finished"),
                Err(e) => error!(error = %e, "Scheduled refresh failed"),
            }
        }
    }))
}
