use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::observability;
use crate::scheduler::{Scheduler, now_ms};

const REAP_INTERVAL: Duration = Duration::from_secs(60);
const COMPACT_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that prunes reservations whose range ended more than
/// `retention_ms` ago. Ended reservations never conflict with anything, so
/// this is purely a memory/journal bound, not a correctness mechanism.
pub async fn run_reaper(scheduler: Arc<Scheduler>, retention_ms: i64) {
    let mut interval = tokio::time::interval(REAP_INTERVAL);
    loop {
        interval.tick().await;
        let cutoff = now_ms() - retention_ms;
        let prunable = scheduler.collect_prunable(cutoff);
        if prunable.is_empty() {
            continue;
        }
        let mut pruned = 0u64;
        for (reservation_id, _item_id) in prunable {
            match scheduler.drop_reservation(reservation_id).await {
                Ok(_) => pruned += 1,
                Err(e) => {
                    // May have raced with an explicit release
                    debug!("reaper skip {reservation_id}: {e}");
                }
            }
        }
        if pruned > 0 {
            metrics::counter!(observability::RESERVATIONS_PRUNED_TOTAL).increment(pruned);
            info!("reaped {pruned} ended reservations");
        }
    }
}

/// Background task that rewrites the journal once enough appends have
/// accumulated since the last compaction.
pub async fn run_compactor(scheduler: Arc<Scheduler>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_INTERVAL);
    loop {
        interval.tick().await;
        let appends = scheduler.journal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match scheduler.compact_journal().await {
            Ok(()) => info!("compacted journal after {appends} appends"),
            Err(e) => tracing::error!("journal compaction failed: {e}"),
        }
    }
}
