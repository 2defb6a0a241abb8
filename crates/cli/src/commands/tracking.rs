//! One-off mock tracking sweep.
//!
//! Runs the same sweep the server runs periodically. Useful in demos to push
//! mock shipments forward without waiting for the interval.

use std::sync::Arc;

use threadline_storefront::db::{PgStore, Store};
use threadline_storefront::state::AppState;

use super::connect;

/// Refresh every order in transit once.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn sweep() -> Result<(), Box<dyn std::error::Error>> {
    let (config, pool) = connect().await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let state = AppState::new(config, store);

    let report = state.tracking().sweep().await?;
    tracing::info!(
        checked = report.checked,
        dispatched = report.dispatched,
        delivered = report.delivered,
        failed = report.failed,
        "Sweep complete"
    );
    Ok(())
}
