//! Profile preferences, stored as key-value pairs.
//!
//! Kept apart from the menu cache: logging out wipes these keys and must
//! never touch the menu, and a menu reset must never touch these.

use crate::error::StorageResult;
use regex_lite::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

const KEY_FIRST_NAME: &str = "first_name";
const KEY_LAST_NAME: &str = "last_name";
const KEY_EMAIL: &str = "email";
const KEY_PHONE: &str = "phone";
const KEY_AVATAR: &str = "avatar";
const KEY_ORDER_STATUSES: &str = "notify_order_statuses";
const KEY_PASSWORD_CHANGES: &str = "notify_password_changes";
const KEY_SPECIAL_OFFERS: &str = "notify_special_offers";
const KEY_NEWSLETTER: &str = "notify_newsletter";

static FIRST_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]+$").expect("static regex"));
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex"));

/// Email notification toggles on the profile screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub order_statuses: bool,
    pub password_changes: bool,
    pub special_offers: bool,
    pub newsletter: bool,
}

/// The signed-in user's profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    /// Local URI of the picked avatar image.
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub notifications: NotificationPreferences,
}

impl Profile {
    /// Avatar placeholder text: first letter of each name, uppercased.
    pub fn initials(&self) -> String {
        self.first_name
            .chars()
            .next()
            .into_iter()
            .chain(self.last_name.chars().next())
            .flat_map(char::to_uppercase)
            .collect()
    }
}

/// Why the onboarding form cannot be submitted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OnboardingError {
    #[error("first name must contain letters only")]
    InvalidFirstName,

    #[error("email address is not valid")]
    InvalidEmail,
}

/// Checks the onboarding form fields.
pub fn validate_onboarding(first_name: &str, email: &str) -> Result<(), OnboardingError> {
    if !FIRST_NAME_RE.is_match(first_name) {
        return Err(OnboardingError::InvalidFirstName);
    }
    if !EMAIL_RE.is_match(email) {
        return Err(OnboardingError::InvalidEmail);
    }
    Ok(())
}

/// Key-value preference store backed by SQLite.
#[derive(Clone)]
pub struct ProfileStore {
    conn: Arc<Mutex<Connection>>,
}

impl ProfileStore {
    /// Opens or creates the preference store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = crate::open_sqlite(path)?;
        initialize_preferences_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory preference store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = crate::open_sqlite_in_memory()?;
        initialize_preferences_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("profile store recovering from poisoned mutex");
            poisoned.into_inner()
        })
    }

    pub fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.lock_conn();
        let value = conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO preferences (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Loads the profile. Missing keys fall back to defaults.
    pub fn load(&self) -> StorageResult<Profile> {
        Ok(Profile {
            first_name: self.get(KEY_FIRST_NAME)?.unwrap_or_default(),
            last_name: self.get(KEY_LAST_NAME)?.unwrap_or_default(),
            email: self.get(KEY_EMAIL)?.unwrap_or_default(),
            phone: self.get(KEY_PHONE)?.unwrap_or_default(),
            avatar: self.get(KEY_AVATAR)?,
            notifications: NotificationPreferences {
                order_statuses: self.get_flag(KEY_ORDER_STATUSES)?,
                password_changes: self.get_flag(KEY_PASSWORD_CHANGES)?,
                special_offers: self.get_flag(KEY_SPECIAL_OFFERS)?,
                newsletter: self.get_flag(KEY_NEWSLETTER)?,
            },
        })
    }

    /// Saves every profile field in one transaction.
    ///
    /// A `None` avatar leaves any stored avatar in place.
    pub fn save(&self, profile: &Profile) -> StorageResult<()> {
        let mut conn = self.lock_conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO preferences (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )?;
            let n = &profile.notifications;
            let mut entries: Vec<(&str, String)> = vec![
                (KEY_FIRST_NAME, profile.first_name.clone()),
                (KEY_LAST_NAME, profile.last_name.clone()),
                (KEY_EMAIL, profile.email.clone()),
                (KEY_PHONE, profile.phone.clone()),
                (KEY_ORDER_STATUSES, serde_json::to_string(&n.order_statuses)?),
                (KEY_PASSWORD_CHANGES, serde_json::to_string(&n.password_changes)?),
                (KEY_SPECIAL_OFFERS, serde_json::to_string(&n.special_offers)?),
                (KEY_NEWSLETTER, serde_json::to_string(&n.newsletter)?),
            ];
            if let Some(avatar) = &profile.avatar {
                entries.push((KEY_AVATAR, avatar.clone()));
            }
            for (key, value) in &entries {
                stmt.execute(params![key, value])?;
            }
        }
        tx.commit()?;
        debug!("profile saved");
        Ok(())
    }

    /// Removes every stored preference (logout).
    pub fn clear(&self) -> StorageResult<()> {
        let conn = self.lock_conn();
        let removed = conn.execute("DELETE FROM preferences", [])?;
        info!("profile cleared ({removed} keys)");
        Ok(())
    }

    /// True once onboarding has stored a first name and an email.
    pub fn is_onboarded(&self) -> StorageResult<bool> {
        let has = |key: &str| -> StorageResult<bool> {
            Ok(self.get(key)?.is_some_and(|v| !v.is_empty()))
        };
        Ok(has(KEY_FIRST_NAME)? && has(KEY_EMAIL)?)
    }

    fn get_flag(&self, key: &str) -> StorageResult<bool> {
        let Some(raw) = self.get(key)? else {
            return Ok(false);
        };
        match serde_json::from_str::<bool>(&raw) {
            Ok(flag) => Ok(flag),
            Err(e) => {
                warn!("ignoring malformed preference {key}={raw:?}: {e}");
                Ok(false)
            }
        }
    }
}

fn initialize_preferences_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS preferences (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}
