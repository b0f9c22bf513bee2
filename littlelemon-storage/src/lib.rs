//! SQLite storage layer for Little Lemon.
//!
//! Holds the on-device menu cache and the profile preferences.
//!
//! # Architecture
//!
//! - The menu cache is a single `menu` table that is wiped and refilled on
//!   every successful sync; the remote menu is authoritative
//! - Rows are only written after normalization (see [`NewMenuItem`])
//! - Queries that fail for any reason other than an unreachable store are
//!   logged and answered with an empty result
//! - Profile preferences live in a separate key-value table

mod error;
mod menu_store;
mod profile_store;
mod types;

pub use error::{StorageError, StorageResult};
pub use menu_store::{MenuStore, ReplaceReport, SchemaChange};
pub use profile_store::{
    validate_onboarding, NotificationPreferences, OnboardingError, Profile, ProfileStore,
};
pub use types::{MenuFilter, MenuItem, NewMenuItem, DEFAULT_CATEGORIES};

use std::path::Path;
use std::time::Duration;

/// Open a SQLite connection at `path` with the pragmas every store uses.
///
/// Any failure to open or configure the file is reported as
/// [`StorageError::Unavailable`], since nothing else can be done with a
/// store that cannot be reached.
pub fn open_sqlite(path: &Path) -> StorageResult<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path).map_err(|e| {
        StorageError::Unavailable(format!("failed to open {}: {e}", path.display()))
    })?;
    apply_pragmas(&conn)?;
    Ok(conn)
}

/// Open an in-memory SQLite connection (for testing).
pub fn open_sqlite_in_memory() -> StorageResult<rusqlite::Connection> {
    let conn = rusqlite::Connection::open_in_memory()
        .map_err(|e| StorageError::Unavailable(format!("failed to open in-memory db: {e}")))?;
    apply_pragmas(&conn)?;
    Ok(conn)
}

fn apply_pragmas(conn: &rusqlite::Connection) -> StorageResult<()> {
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(|e| StorageError::Unavailable(format!("failed to set busy timeout: {e}")))?;
    // journal_mode returns a row, so it cannot go through execute_batch.
    let _mode: String = conn
        .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
        .map_err(|e| StorageError::Unavailable(format!("failed to set journal mode: {e}")))?;
    Ok(())
}
