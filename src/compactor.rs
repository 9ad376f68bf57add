use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::{StoreError, WalStore};

/// Compact `store` if at least `threshold` records were appended since the
/// last compaction. Returns whether a compaction ran.
pub async fn compact_if_due(store: &WalStore, threshold: u64) -> Result<bool, StoreError> {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    store.compact().await?;
    info!("compacted WAL after {appends} appends, {} appointments kept", store.len());
    Ok(true)
}

/// Background task that keeps the WAL from growing without bound.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        match compact_if_due(&store, threshold).await {
            Ok(true) => {}
            Ok(false) => debug!("compaction not due"),
            Err(StoreError::Closed) => {
                warn!("WAL writer gone, compactor exiting");
                return;
            }
            Err(e) => warn!("compaction failed: {e}"),
        }
    }
}
