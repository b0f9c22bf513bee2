//! Read-side facade over the menu cache.

use crate::error::SyncResult;
use littlelemon_storage::{MenuFilter, MenuItem, MenuStore, DEFAULT_CATEGORIES};
use tracing::debug;

/// Answers the home screen's filtered and category queries.
#[derive(Clone, Debug)]
pub struct MenuQuery {
    store: MenuStore,
}

impl MenuQuery {
    pub fn new(store: MenuStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &MenuStore {
        &self.store
    }

    /// Items matching `filter`, in insertion order.
    pub fn query(&self, filter: &MenuFilter) -> SyncResult<Vec<MenuItem>> {
        let items = self.store.query_filtered(filter)?;
        debug!(
            "menu query ({} categories, search {:?}) -> {} items",
            filter.categories.len(),
            filter.search_term(),
            items.len()
        );
        Ok(items)
    }

    pub fn query_by<I, S>(&self, categories: I, text: &str) -> SyncResult<Vec<MenuItem>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query(&MenuFilter::new(categories, text))
    }

    /// Categories present in the cache, or the built-in chip list while the
    /// cache is still empty.
    pub fn list_categories(&self) -> SyncResult<Vec<String>> {
        let stored = self.store.list_distinct_categories()?;
        if stored.is_empty() {
            return Ok(DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect());
        }
        Ok(stored)
    }
}
