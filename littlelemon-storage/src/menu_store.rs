//! Menu cache: a single `menu` table that mirrors the remote menu.
//!
//! The table is a disposable cache. Every successful sync deletes all rows
//! and inserts the freshly fetched set; nothing is merged. Row ids come from
//! `AUTOINCREMENT`, so they keep increasing across replacements.

use crate::error::{StorageError, StorageResult};
use crate::types::{MenuFilter, MenuItem, NewMenuItem};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

const SELECT_COLUMNS: &str = "SELECT id, name, description, price, image, category FROM menu";

/// What `ensure_schema` had to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaChange {
    Unchanged,
    Created,
    /// An older table without the `category` column was migrated.
    AddedCategoryColumn,
}

/// Outcome of a `replace_all` batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceReport {
    /// Rows deleted before inserting.
    pub removed: usize,
    pub inserted: usize,
    /// Rows that failed to insert and were skipped.
    pub failed: usize,
    /// Set when the batch itself could not run (the delete or the insert
    /// statement failed). The cache may have been emptied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_error: Option<String>,
}

impl ReplaceReport {
    fn aborted(removed: usize, err: &StorageError) -> Self {
        Self {
            removed,
            batch_error: Some(err.to_string()),
            ..Self::default()
        }
    }

    /// False when the batch as a whole failed.
    pub fn is_complete(&self) -> bool {
        self.batch_error.is_none()
    }
}

/// Owned handle to the menu cache.
///
/// Cloning shares the same connection. After [`MenuStore::close`] every
/// operation fails with [`StorageError::Unavailable`].
#[derive(Clone)]
pub struct MenuStore {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl MenuStore {
    /// Opens or creates the cache database at the given path.
    ///
    /// The schema is not touched; call [`MenuStore::ensure_schema`] first.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = crate::open_sqlite(path)?;
        info!("menu store opened at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// Opens an in-memory cache (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::from_connection(crate::open_sqlite_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        }
    }

    /// Acquire the connection lock, recovering from poison.
    fn lock_conn(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("menu store recovering from poisoned mutex");
            poisoned.into_inner()
        })
    }

    fn with_conn<T>(&self, op: impl FnOnce(&Connection) -> StorageResult<T>) -> StorageResult<T> {
        let guard = self.lock_conn();
        let conn = guard
            .as_ref()
            .ok_or_else(|| StorageError::Unavailable("menu store is closed".to_string()))?;
        op(conn)
    }

    pub fn is_open(&self) -> bool {
        self.lock_conn().is_some()
    }

    /// Closes the underlying connection. Idempotent.
    pub fn close(&self) {
        let taken = self.lock_conn().take();
        if let Some(conn) = taken {
            if let Err((_, e)) = conn.close() {
                warn!("menu store did not close cleanly: {e}");
            }
            info!("menu store closed");
        }
    }

    /// Creates the `menu` table if needed and adds the `category` column to
    /// tables created before it existed. Safe to call on every startup.
    pub fn ensure_schema(&self) -> StorageResult<SchemaChange> {
        self.with_conn(|conn| {
            let existed: bool = conn.query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'menu'",
                [],
                |row| row.get(0),
            )?;

            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS menu (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT,
                    description TEXT,
                    price REAL,
                    image TEXT,
                    category TEXT
                );
                "#,
            )?;

            if !existed {
                info!("menu table created");
                return Ok(SchemaChange::Created);
            }

            if has_column(conn, "menu", "category")? {
                return Ok(SchemaChange::Unchanged);
            }

            conn.execute_batch("ALTER TABLE menu ADD COLUMN category TEXT")?;
            info!("category column added to menu table");
            Ok(SchemaChange::AddedCategoryColumn)
        })
    }

    /// Deletes every row, then inserts `items` one by one.
    ///
    /// Not atomic: a row that fails to insert is logged and skipped and the
    /// rest of the batch continues. If the delete or the insert statement
    /// fails, the batch stops and the report carries `batch_error`.
    pub fn replace_all(&self, items: &[NewMenuItem]) -> StorageResult<ReplaceReport> {
        self.with_conn(|conn| {
            let removed = match conn.execute("DELETE FROM menu", []) {
                Ok(n) => n,
                Err(e) => {
                    let err = StorageError::from(e);
                    warn!("replace menu failed before delete: {err}");
                    return Ok(ReplaceReport::aborted(0, &err));
                }
            };

            let mut stmt = match conn.prepare(
                "INSERT INTO menu (name, description, price, image, category) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            ) {
                Ok(stmt) => stmt,
                Err(e) => {
                    let err = StorageError::from(e);
                    warn!("replace menu failed after removing {removed} rows: {err}");
                    return Ok(ReplaceReport::aborted(removed, &err));
                }
            };

            let mut report = ReplaceReport {
                removed,
                ..ReplaceReport::default()
            };
            for item in items {
                match stmt.execute(params![
                    item.name,
                    item.description,
                    item.price,
                    item.image,
                    item.category,
                ]) {
                    Ok(_) => report.inserted += 1,
                    Err(source) => {
                        let err = StorageError::RowInsert {
                            name: item.name.clone(),
                            source,
                        };
                        warn!("{err}");
                        report.failed += 1;
                    }
                }
            }

            debug!(
                "menu replaced: removed {}, inserted {}, failed {}",
                report.removed, report.inserted, report.failed
            );
            Ok(report)
        })
    }

    /// Returns the rows matching `filter`, in insertion order.
    pub fn query_filtered(&self, filter: &MenuFilter) -> StorageResult<Vec<MenuItem>> {
        let result = self.with_conn(|conn| {
            let (sql, args) = build_filter_query(filter);
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(params_from_iter(args.iter()), row_to_item)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        });
        swallow("filtered menu query", result)
    }

    /// Distinct non-empty categories, in order of first appearance.
    pub fn list_distinct_categories(&self) -> StorageResult<Vec<String>> {
        let result = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT category FROM menu \
                 WHERE category IS NOT NULL AND category <> '' \
                 GROUP BY category ORDER BY MIN(id)",
            )?;
            let categories = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(categories)
        });
        swallow("category listing", result)
    }

    pub fn count(&self) -> StorageResult<usize> {
        let result = self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM menu", [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or_default())
        });
        swallow("menu count", result)
    }

    /// Deletes every row but keeps the table. Returns the number of rows removed.
    pub fn clear(&self) -> StorageResult<usize> {
        let result = self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM menu", [])?;
            info!("menu cleared ({removed} rows)");
            Ok(removed)
        });
        swallow("clear menu", result)
    }

    /// Drops the `menu` table entirely.
    pub fn drop_schema(&self) -> StorageResult<()> {
        let result = self.with_conn(|conn| {
            conn.execute_batch("DROP TABLE IF EXISTS menu")?;
            info!("menu table dropped");
            Ok(())
        });
        swallow("drop menu table", result)
    }
}

impl std::fmt::Debug for MenuStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuStore")
            .field("open", &self.is_open())
            .finish()
    }
}

/// Passes `Unavailable` through; logs anything else and returns the default value.
fn swallow<T: Default>(op: &str, result: StorageResult<T>) -> StorageResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_unavailable() => Err(e),
        Err(e) => {
            warn!("{op} failed: {e}");
            Ok(T::default())
        }
    }
}

fn has_column(conn: &Connection, table: &str, column: &str) -> StorageResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}

fn build_filter_query(filter: &MenuFilter) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut args = Vec::new();

    if !filter.categories.is_empty() {
        let placeholders = vec!["?"; filter.categories.len()].join(", ");
        conditions.push(format!("category IN ({placeholders})"));
        args.extend(filter.categories.iter().cloned());
    }

    if let Some(term) = filter.search_term() {
        conditions.push(r"name LIKE ? ESCAPE '\'".to_string());
        args.push(format!("%{}%", escape_like(term)));
    }

    let mut sql = SELECT_COLUMNS.to_string();
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY id");
    (sql, args)
}

/// Escapes `LIKE` wildcards so the search text matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<MenuItem> {
    // Rows written before the category migration carry NULLs.
    Ok(MenuItem {
        id: row.get(0)?,
        name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        price: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
        image: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        category: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
    })
}
