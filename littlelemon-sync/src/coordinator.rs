//! Startup sync: ensure schema, fetch the remote menu, replace the cache.
//!
//! States move `Idle → SchemaReady → Synced | SyncFailed`. An empty remote
//! menu leaves the coordinator in `SchemaReady` with the previous cache
//! untouched. Nothing retries on its own once a terminal state is reached;
//! calling [`SyncCoordinator::initialize_sync`] again starts over from
//! `Idle`.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::source::MenuSource;
use chrono::{DateTime, Utc};
use littlelemon_storage::{MenuStore, NewMenuItem};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    SchemaReady,
    Synced,
    SyncFailed,
}

/// Snapshot of the last sync run, for the UI's degraded-state indicator.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Fetch attempts made in the current run.
    pub attempts: u32,
    pub last_error: Option<String>,
    /// When the cache was last replaced. Survives later failed runs.
    pub last_synced_at: Option<DateTime<Utc>>,
    pub items_inserted: usize,
    pub items_failed: usize,
}

impl SyncStatus {
    /// True when the UI is serving a cache that the last run could not refresh
    /// or only partially refreshed.
    pub fn is_degraded(&self) -> bool {
        self.state == SyncState::SyncFailed || self.items_failed > 0
    }
}

/// Drives one menu sync at a time against a store and a source.
pub struct SyncCoordinator {
    store: MenuStore,
    source: Arc<dyn MenuSource>,
    config: SyncConfig,
    status_tx: watch::Sender<SyncStatus>,
    /// Serializes overlapping `initialize_sync` calls.
    run_lock: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(store: MenuStore, source: Arc<dyn MenuSource>, config: SyncConfig) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::default());
        Self {
            store,
            source,
            config,
            status_tx,
            run_lock: Mutex::new(()),
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Runs a full sync.
    ///
    /// Only an unreachable store is returned as an error. Schema, fetch and
    /// format failures are logged and end in `SyncFailed`; the cache is left
    /// untouched. A replace that fails as a whole also ends in `SyncFailed`.
    pub async fn initialize_sync(&self) -> SyncResult<SyncStatus> {
        let _guard = self.run_lock.lock().await;

        self.status_tx.send_modify(|s| {
            s.state = SyncState::Idle;
            s.attempts = 0;
            s.last_error = None;
        });

        if let Err(e) = self.store.ensure_schema() {
            self.status_tx.send_modify(|s| {
                s.state = SyncState::SyncFailed;
                s.last_error = Some(e.to_string());
            });
            if e.is_unavailable() {
                error!("menu store unavailable: {e}");
                return Err(e.into());
            }
            warn!("menu schema setup failed, serving cached menu: {e}");
            return Ok(self.status());
        }
        self.set_state(SyncState::SchemaReady);
        debug!("menu schema ready");

        match self.fetch_with_retry().await {
            Ok(items) if items.is_empty() => {
                warn!("remote menu is empty, keeping cached menu");
            }
            Ok(items) => {
                let report = self.store.replace_all(&items)?;
                if let Some(reason) = report.batch_error {
                    error!("menu cache replace failed: {reason}");
                    self.status_tx.send_modify(|s| {
                        s.state = SyncState::SyncFailed;
                        s.last_error = Some(format!("menu cache replace failed: {reason}"));
                        s.items_inserted = 0;
                        s.items_failed = 0;
                    });
                    return Ok(self.status());
                }
                info!(
                    "menu synced: {} items stored, {} skipped",
                    report.inserted, report.failed
                );
                self.status_tx.send_modify(|s| {
                    s.state = SyncState::Synced;
                    s.last_synced_at = Some(Utc::now());
                    s.items_inserted = report.inserted;
                    s.items_failed = report.failed;
                });
            }
            Err(e) => {
                warn!("menu sync failed, serving cached menu: {e}");
                self.status_tx.send_modify(|s| {
                    s.state = SyncState::SyncFailed;
                    s.last_error = Some(e.to_string());
                });
            }
        }

        Ok(self.status())
    }

    /// Starts [`SyncCoordinator::initialize_sync`] in the background.
    pub fn spawn_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.initialize_sync().await {
                error!("menu sync aborted: {e}");
            }
        })
    }

    async fn fetch_with_retry(&self) -> SyncResult<Vec<NewMenuItem>> {
        let mut attempt = 0;
        loop {
            self.status_tx.send_modify(|s| s.attempts = attempt + 1);
            match self.source.fetch_menu().await {
                Ok(items) => return Ok(items),
                Err(e) if e.is_retryable() && attempt < self.config.max_fetch_retries => {
                    let backoff = self.config.retry_backoff(attempt);
                    warn!("menu fetch failed ({e}), retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn set_state(&self, state: SyncState) {
        self.status_tx.send_modify(|s| s.state = state);
    }
}
