//! Home screen filter state and the menu view it produces.
//!
//! Category changes query the cache right away. Search edits are debounced
//! and the query reads whatever the filter holds when the timer fires, so a
//! burst of keystrokes costs one query. Every query gets a generation number
//! up front and a result is only published if nothing newer has been
//! published already.

use crate::debounce::Debouncer;
use crate::error::SyncResult;
use crate::query::MenuQuery;
use littlelemon_storage::{MenuFilter, MenuItem};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

/// What the home screen currently shows.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MenuView {
    /// Increases with every query issued; 0 before the first one.
    pub generation: u64,
    /// Filter the items were queried with.
    pub filter: MenuFilter,
    pub items: Vec<MenuItem>,
}

struct BrowserState {
    query: MenuQuery,
    filter: Mutex<MenuFilter>,
    generation: AtomicU64,
    view_tx: watch::Sender<MenuView>,
}

impl BrowserState {
    fn lock_filter(&self) -> MutexGuard<'_, MenuFilter> {
        self.filter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copies the filter and numbers the copy under one lock, so generation
    /// order always matches the order filter states were taken in.
    fn snapshot(&self) -> (MenuFilter, u64) {
        let guard = self.lock_filter();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (guard.clone(), generation)
    }

    fn run_query(&self) -> SyncResult<MenuView> {
        let (filter, generation) = self.snapshot();
        let items = self.query.query(&filter)?;

        let view = MenuView {
            generation,
            filter,
            items,
        };
        let published = self.view_tx.send_if_modified(|current| {
            if view.generation > current.generation {
                *current = view.clone();
                true
            } else {
                false
            }
        });
        if !published {
            debug!("menu view generation {generation} superseded, not published");
        }
        Ok(view)
    }
}

/// Owns the filter state and publishes [`MenuView`] snapshots.
pub struct MenuBrowser {
    state: Arc<BrowserState>,
    debouncer: Debouncer,
}

impl MenuBrowser {
    /// Creates the browser and runs the initial unfiltered query.
    ///
    /// Debounced searches are spawned on `runtime`.
    pub fn new(query: MenuQuery, search_debounce: Duration, runtime: Handle) -> Self {
        let (view_tx, _) = watch::channel(MenuView::default());
        let browser = Self {
            state: Arc::new(BrowserState {
                query,
                filter: Mutex::new(MenuFilter::default()),
                generation: AtomicU64::new(0),
                view_tx,
            }),
            debouncer: Debouncer::new(search_debounce, runtime),
        };
        if let Err(e) = browser.refresh() {
            warn!("initial menu query failed: {e}");
        }
        browser
    }

    pub fn subscribe(&self) -> watch::Receiver<MenuView> {
        self.state.view_tx.subscribe()
    }

    /// Latest published view.
    pub fn view(&self) -> MenuView {
        self.state.view_tx.borrow().clone()
    }

    /// Current filter state, including search text not yet queried.
    pub fn filter(&self) -> MenuFilter {
        self.state.lock_filter().clone()
    }

    /// Selects or deselects a category and queries immediately.
    pub fn toggle_category(&self, label: &str) -> SyncResult<MenuView> {
        let selected = self.state.lock_filter().toggle_category(label);
        debug!("category {label:?} selected: {selected}");
        self.state.run_query()
    }

    pub fn set_categories<I, S>(&self, labels: I) -> SyncResult<MenuView>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock_filter().categories = labels.into_iter().map(Into::into).collect();
        self.state.run_query()
    }

    pub fn clear_categories(&self) -> SyncResult<MenuView> {
        self.state.lock_filter().categories.clear();
        self.state.run_query()
    }

    /// Records the search text and schedules a debounced query.
    pub fn set_search_text(&self, text: impl Into<String>) {
        self.state.lock_filter().search = text.into();

        let state = Arc::clone(&self.state);
        self.debouncer.schedule(move || {
            if let Err(e) = state.run_query() {
                warn!("debounced menu search failed: {e}");
            }
        });
    }

    /// Queries immediately with the current filter.
    pub fn refresh(&self) -> SyncResult<MenuView> {
        self.state.run_query()
    }

    pub fn has_pending_search(&self) -> bool {
        self.debouncer.is_pending()
    }
}

impl std::fmt::Debug for MenuBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuBrowser")
            .field("filter", &self.filter())
            .field("debouncer", &self.debouncer)
            .finish()
    }
}
