use std::{sync::Arc, time::Duration};

use akiba_engine::{cache::ReadCache, events::EventProducers, ReconciliationApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

/// Starts the expiry sweep worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// The sweep is idempotent and the underlying transition is atomic, so a second instance of this worker (or a
/// concurrent manual sweep) never double-expires an entry.
pub fn start_sweep_worker(
    db: SqliteDatabase,
    cache: Arc<ReadCache>,
    producers: EventProducers,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let api = ReconciliationApi::new(db, cache, producers);
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Pending operation expiry worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running pending operation expiry job");
            match api.sweep_expired().await {
                Ok(result) if result.count() > 0 => {
                    info!("🕰️ {} pending operations expired", result.count());
                    debug!("🕰️ Expired operations: {}", op_list(&result.expired));
                },
                Ok(_) => {},
                Err(e) => {
                    error!("🕰️ Error running pending operation expiry job: {e}");
                },
            }
        }
    })
}

fn op_list(ops: &[akiba_engine::db_types::PendingOperation]) -> String {
    ops.iter()
        .map(|o| format!("[{}] {} user #{} amount {}", o.correlation_id, o.kind, o.user_id, o.amount))
        .collect::<Vec<String>>()
        .join(", ")
}
