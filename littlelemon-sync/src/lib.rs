//! Menu sync engine for Little Lemon.
//!
//! Provides the pieces the app shell calls into:
//! - Remote menu source (HTTP fetch + normalization)
//! - Sync coordinator (ensure schema, fetch, replace cache)
//! - Menu query facade over the local cache
//! - Debounced menu browser that owns the home screen filter state

pub mod browser;
pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod normalize;
pub mod query;
pub mod source;

pub use browser::{MenuBrowser, MenuView};
pub use config::SyncConfig;
pub use coordinator::{SyncCoordinator, SyncState, SyncStatus};
pub use debounce::Debouncer;
pub use error::{SyncError, SyncResult};
pub use query::MenuQuery;
pub use source::{HttpMenuSource, MenuSource};
