//! Periodic progress reporting for a running harvest.

use std::{sync::Arc, time::Duration};

use {tokio_util::sync::CancellationToken, tracing::info};

use gleaner_collector::LiveCounters;

/// Log aggregate counters every `interval` until `stop` fires, then emit one
/// final line so the last state always reaches the log.
pub fn spawn_reporter(
    counters: Arc<LiveCounters>,
    interval: Duration,
    stop: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so the first line carries
        // real progress.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = counters.snapshot();
                    info!(
                        records = snapshot.records,
                        scrolls = snapshot.scrolls,
                        duplicates = snapshot.duplicates,
                        errors = snapshot.errors,
                        "harvest progress"
                    );
                },
            }
        }
        let snapshot = counters.snapshot();
        info!(
            records = snapshot.records,
            scrolls = snapshot.scrolls,
            duplicates = snapshot.duplicates,
            errors = snapshot.errors,
            "harvest finished"
        );
    })
}
