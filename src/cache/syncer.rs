//! Periodic cache refresh.
//!
//! The syncer reads a [`DirectorySnapshot`] from the spreadsheet and
//! replaces the cache with it:
//! 1. on every tick of the sync interval (the first tick fires immediately),
//! 2. on [`SyncMessage::TriggerSync`], sent after the bot writes,
//! 3. on direct calls to [`CacheSyncer::sync_now`].
//!
//! A failed sync leaves the previous snapshot in place and is retried on
//! the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::{CacheError, CacheStore, SyncStatus};
use crate::sheets::{DirectorySnapshot, Ledger, ValuesApi};

/// Messages accepted by the syncer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMessage {
    /// Sync now instead of waiting for the next tick.
    TriggerSync,
    /// Stop the loop.
    Shutdown,
}

/// Keeps the cache in step with the spreadsheet.
pub struct CacheSyncer<A: ValuesApi> {
    ledger: Arc<Ledger<A>>,
    store: Arc<CacheStore>,
    status: Arc<RwLock<SyncStatus>>,
    interval: Duration,
    /// Serializes syncs started from the loop and from commands.
    running: Mutex<()>,
}

impl<A: ValuesApi> CacheSyncer<A> {
    #[must_use]
    pub fn new(
        ledger: Arc<Ledger<A>>,
        store: Arc<CacheStore>,
        status: Arc<RwLock<SyncStatus>>,
        interval: Duration,
    ) -> Self {
        Self {
            ledger,
            store,
            status,
            interval,
            running: Mutex::new(()),
        }
    }

    /// Runs until `Shutdown` arrives or every sender is dropped.
    pub async fn run(&self, mut rx: mpsc::Receiver<SyncMessage>) {
        info!("Cache syncer started (every {}s)", self.interval.as_secs());

        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.sync_logged().await;
                }
                msg = rx.recv() => {
                    match msg {
                        Some(SyncMessage::TriggerSync) => {
                            debug!("Received sync trigger");
                            self.sync_logged().await;
                            timer.reset();
                        }
                        Some(SyncMessage::Shutdown) | None => {
                            info!("Cache syncer shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn sync_logged(&self) {
        if let Err(e) = self.sync_now().await {
            error!("Cache sync failed: {}", e);
        }
    }

    /// Reads the spreadsheet and replaces the cache.
    ///
    /// Returns the number of rows read.
    ///
    /// # Errors
    ///
    /// Returns an error if the sheet cannot be read or the cache cannot be
    /// written; the status records the failure.
    pub async fn sync_now(&self) -> Result<usize, CacheError> {
        let _guard = self.running.lock().await;
        self.status.write().await.mark_started();

        match self.load_and_store().await {
            Ok(rows) => {
                self.status.write().await.mark_succeeded(rows);
                info!("Cache synced ({} rows)", rows);
                Ok(rows)
            }
            Err(e) => {
                let mut status = self.status.write().await;
                status.mark_failed(&e);
                if status.consecutive_failures > 1 {
                    warn!(
                        "Cache sync failed {} times in a row",
                        status.consecutive_failures
                    );
                }
                Err(e)
            }
        }
    }

    async fn load_and_store(&self) -> Result<usize, CacheError> {
        let snapshot: DirectorySnapshot = self.ledger.snapshot().await?;
        self.store.replace_snapshot(&snapshot, Utc::now()).await?;
        Ok(snapshot.rows_read)
    }

    #[must_use]
    pub fn status(&self) -> &Arc<RwLock<SyncStatus>> {
        &self.status
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl<A: ValuesApi> std::fmt::Debug for CacheSyncer<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSyncer")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
