//! Menu records and filter state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Category chips shown by the home screen before the cache has been filled.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "starters", "mains", "desserts", "drinks", "specials", "salads", "soups",
];

/// A menu item as stored in the cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    /// Store-assigned, never reused.
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub image: String,
    pub category: String,
}

impl MenuItem {
    /// Builds the full image URL for this item, or `None` if it has no image.
    pub fn image_url(&self, base_url: &str) -> Option<String> {
        if self.image.is_empty() {
            return None;
        }
        Some(format!(
            "{}/{}?raw=true",
            base_url.trim_end_matches('/'),
            self.image
        ))
    }
}

/// A normalized menu item that has not been stored yet.
///
/// Every field is present; remote records are coerced into this shape
/// before they reach the store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMenuItem {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub image: String,
    pub category: String,
}

impl NewMenuItem {
    pub fn new(name: impl Into<String>, category: impl Into<String>, price: f64) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            price,
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }
}

/// Selected categories plus free-text search.
///
/// An empty category set means "every category"; a blank search means
/// "every name".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuFilter {
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub search: String,
}

impl MenuFilter {
    pub fn new<I, S>(categories: I, search: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
            search: search.into(),
        }
    }

    /// The search text, or `None` when it is empty or whitespace-only.
    pub fn search_term(&self) -> Option<&str> {
        if self.search.trim().is_empty() {
            None
        } else {
            Some(&self.search)
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        self.categories.is_empty() && self.search_term().is_none()
    }

    /// Selects `label` if it was not selected, deselects it otherwise.
    /// Returns whether the label is selected afterwards.
    pub fn toggle_category(&mut self, label: &str) -> bool {
        if self.categories.remove(label) {
            false
        } else {
            self.categories.insert(label.to_string());
            true
        }
    }

    /// In-memory form of the predicate `MenuStore::query_filtered` runs in SQL.
    ///
    /// Case folding is ASCII-only, matching SQLite's `LIKE`.
    pub fn matches(&self, item: &MenuItem) -> bool {
        if !self.categories.is_empty() && !self.categories.contains(&item.category) {
            return false;
        }
        match self.search_term() {
            Some(term) => item
                .name
                .to_ascii_lowercase()
                .contains(&term.to_ascii_lowercase()),
            None => true,
        }
    }
}
