//! Sync configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the menu sync engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// URL of the JSON menu document.
    pub menu_url: String,

    /// Base URL that item image names are resolved against.
    pub image_base_url: String,

    /// Timeout for the menu request, in seconds.
    pub request_timeout_secs: u64,

    /// Extra fetch attempts after a transport failure.
    pub max_fetch_retries: u32,

    /// Delay before the first retry; doubles on every further retry.
    pub retry_backoff_ms: u64,

    /// Quiet period before a search keystroke triggers a query.
    pub search_debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            menu_url: "https://raw.githubusercontent.com/Meta-Mobile-Developer-PC/Working-With-Data-API/main/capstone.json".to_string(),
            image_base_url: "https://github.com/Meta-Mobile-Developer-PC/Working-With-Data-API/blob/main/images".to_string(),
            request_timeout_secs: 30,
            max_fetch_retries: 1,
            retry_backoff_ms: 500,
            search_debounce_ms: 500,
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    /// Backoff before retry number `attempt` (zero-based).
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(1 << attempt.min(16)))
    }
}
