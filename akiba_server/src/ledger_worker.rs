use std::{sync::Arc, time::Duration};

use akiba_engine::{
    cache::ReadCache,
    events::EventProducers,
    ledger::{ChainEvent, LedgerClient},
    ReconciliationApi,
    SqliteDatabase,
};
use log::*;
use tokio::task::JoinHandle;

use crate::integrations::LedgerRelayClient;

/// Starts the ledger event worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// The worker polls the relay's event log and feeds each event to the reconciliation engine. The cursor only
/// advances past a block once every event in it has been processed, so a crash or transient failure causes
/// redelivery rather than loss, and the engine's idempotence guard makes redelivery harmless.
pub fn start_ledger_worker(
    db: SqliteDatabase,
    cache: Arc<ReadCache>,
    producers: EventProducers,
    ledger: LedgerRelayClient,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let api = ReconciliationApi::new(db, cache, producers);
        let mut cursor: u64 = 0;
        let mut timer = tokio::time::interval(poll_interval);
        info!("🔗️ Ledger event worker started");
        loop {
            timer.tick().await;
            let records = match ledger.poll_events(cursor).await {
                Ok(records) => records,
                Err(e) => {
                    warn!("🔗️ Could not poll ledger events after block {cursor}: {e}. Retrying on the next tick.");
                    continue;
                },
            };
            let mut advanced = cursor;
            for record in records {
                let event = match ChainEvent::try_from(record) {
                    Ok(event) => event,
                    Err(e) => {
                        // fail fast per event, but a malformed record must not wedge the stream
                        warn!("🔗️ Skipping malformed ledger event: {e}");
                        continue;
                    },
                };
                let block = event.block_number;
                match api.process_ledger_event(event).await {
                    Ok(_) => {
                        advanced = advanced.max(block);
                    },
                    Err(e) => {
                        error!(
                            "🔗️ Could not process ledger event at block {block}: {e}. Holding the cursor at \
                             {cursor} so the event is redelivered."
                        );
                        advanced = cursor;
                        break;
                    },
                }
            }
            cursor = advanced;
        }
    })
}
