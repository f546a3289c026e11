//! Background reclamation of expired session records and stale ledger
//! entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

use super::SessionStore;
use crate::auth::AttemptLedger;

/// Spawn the periodic sweeper. It wakes every `sweep_interval`, removes
/// session records untouched for `remember_lifetime` seconds, prunes
/// ledger entries with no live failures, and exits between scans when
/// `shutdown` flips to true. No record is held open across the sleep.
pub fn spawn(
    store: Arc<dyn SessionStore>,
    ledger: Arc<AttemptLedger>,
    sweep_interval: Duration,
    remember_lifetime: u64,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(sweep_interval);
        // The first tick fires immediately; skip it so startup is quiet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.sweep(remember_lifetime).await {
                        Ok(0) => debug!("Session sweep found nothing to reclaim"),
                        Ok(removed) => info!("Session sweep reclaimed {removed} expired records"),
                        Err(err) => error!("Session sweep failed: {err}"),
                    }
                    ledger.prune_expired();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("Session sweeper shutting down");
                        break;
                    }
                }
            }
        }
    })
}
