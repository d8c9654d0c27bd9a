use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use agora_api::auth::AppState;

/// Background task that settles expired proposals on an interval.
///
/// The read path already settles lazily, so this sweep only guarantees
/// timely transitions while nobody is reading. It reuses the same
/// idempotent statement, so overlapping with request-driven settlement is
/// harmless.
pub async fn run_settlement_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let st = state.clone();
        let settled = tokio::task::spawn_blocking(move || st.db.settle_expired(Utc::now())).await;

        match settled {
            Ok(Ok(count)) if count > 0 => info!("settlement sweep resolved {count} proposals"),
            Ok(Ok(_)) => {}
            Ok(Err(err)) => warn!("settlement sweep failed: {err:#}"),
            Err(err) => warn!("settlement sweep join error: {err}"),
        }
    }
}
