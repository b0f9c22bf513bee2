//! C ABI exports for the Little Lemon mobile shells.
//!
//! The iOS and Android apps call into this library for:
//! - Menu sync on startup (fetch the remote menu, refresh the local cache)
//! - Home screen menu queries (category chips, debounced search)
//! - Profile preferences and onboarding validation
//!
//! All functions use C-compatible types and report errors via return codes.
//! JSON results are written to `out_json` and must be released with
//! `littlelemon_free_string`.

mod menu;
mod profile;

use littlelemon_storage::{MenuStore, OnboardingError, ProfileStore, StorageError};
use littlelemon_sync::{
    HttpMenuSource, MenuBrowser, MenuQuery, SyncConfig, SyncCoordinator, SyncError, SyncState,
};
use serde::Serialize;
use std::ffi::{c_char, CStr, CString};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Error codes returned by FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LittleLemonError {
    /// Operation succeeded.
    Ok = 0,
    /// Null pointer argument.
    NullPointer = 1,
    /// Invalid UTF-8 string.
    InvalidUtf8 = 2,
    /// JSON serialization error.
    JsonError = 3,
    /// Storage error.
    StorageError = 4,
    /// Handle not initialized.
    NotInitialized = 5,
    /// Local database cannot be opened or has been closed.
    StoreUnavailable = 6,
    /// Menu sync ended without refreshing the cache.
    SyncFailed = 7,
    /// A background sync is still in progress.
    SyncAlreadyRunning = 8,
    /// Onboarding first name is not letters only.
    InvalidFirstName = 9,
    /// Onboarding email is malformed.
    InvalidEmail = 10,
    /// Unknown error.
    Unknown = 99,
}

impl From<&StorageError> for LittleLemonError {
    fn from(err: &StorageError) -> Self {
        match err {
            StorageError::Unavailable(_) => Self::StoreUnavailable,
            StorageError::Serialization(_) => Self::JsonError,
            _ => Self::StorageError,
        }
    }
}

impl From<&SyncError> for LittleLemonError {
    fn from(err: &SyncError) -> Self {
        match err {
            SyncError::StoreUnavailable(_) => Self::StoreUnavailable,
            SyncError::Storage(e) => e.into(),
            SyncError::Fetch(_) | SyncError::Http(_) | SyncError::Format(_) => Self::SyncFailed,
        }
    }
}

impl From<OnboardingError> for LittleLemonError {
    fn from(err: OnboardingError) -> Self {
        match err {
            OnboardingError::InvalidFirstName => Self::InvalidFirstName,
            OnboardingError::InvalidEmail => Self::InvalidEmail,
        }
    }
}

/// Opaque handle to the Little Lemon runtime.
pub struct LittleLemonHandle {
    menu_store: MenuStore,
    profile_store: ProfileStore,
    query: MenuQuery,
    browser: Arc<MenuBrowser>,
    coordinator: Arc<SyncCoordinator>,
    sync_task: Option<JoinHandle<()>>,
    config: SyncConfig,
    runtime: Runtime,
}

/// Global handle storage (single instance).
static HANDLE: Mutex<Option<LittleLemonHandle>> = Mutex::new(None);

/// Acquire the HANDLE lock, recovering from poison.
pub(crate) fn lock_handle() -> MutexGuard<'static, Option<LittleLemonHandle>> {
    HANDLE.lock().unwrap_or_else(|poisoned| {
        warn!("recovering from poisoned HANDLE mutex");
        poisoned.into_inner()
    })
}

/// Runs `f` against the live handle, or reports `NotInitialized`.
pub(crate) fn with_handle(f: impl FnOnce(&mut LittleLemonHandle) -> LittleLemonError) -> LittleLemonError {
    let mut handle = lock_handle();
    match handle.as_mut() {
        Some(h) => f(h),
        None => LittleLemonError::NotInitialized,
    }
}

/// Reads a required C string argument.
///
/// # Safety
/// - `ptr` must be null or a valid null-terminated string.
pub(crate) unsafe fn read_cstr<'a>(ptr: *const c_char) -> Result<&'a str, LittleLemonError> {
    if ptr.is_null() {
        return Err(LittleLemonError::NullPointer);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| LittleLemonError::InvalidUtf8)
}

/// Serializes `value` into a newly allocated C string at `out_json`.
///
/// # Safety
/// - `out_json` must be a valid, non-null pointer.
pub(crate) unsafe fn write_json<T: Serialize>(
    value: &T,
    out_json: *mut *mut c_char,
) -> LittleLemonError {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            warn!("failed to serialize FFI result: {e}");
            return LittleLemonError::JsonError;
        }
    };
    match CString::new(json) {
        Ok(c_json) => {
            unsafe { *out_json = c_json.into_raw() };
            LittleLemonError::Ok
        }
        Err(_) => LittleLemonError::JsonError,
    }
}

// ============================================================================
// Core Functions
// ============================================================================

/// Initializes the Little Lemon runtime.
///
/// `db_path` is the menu cache file (`:memory:` for an in-memory cache);
/// profile preferences are stored next to it. `config_json` is an optional
/// JSON object overriding fields of the sync configuration, or null.
///
/// # Safety
/// - `db_path` must be a valid null-terminated UTF-8 string.
/// - `config_json` must be null or a valid null-terminated UTF-8 string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn littlelemon_init(
    db_path: *const c_char,
    config_json: *const c_char,
) -> LittleLemonError { unsafe {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let path = match read_cstr(db_path) {
        Ok(s) => s,
        Err(e) => return e,
    };

    let config = if config_json.is_null() {
        SyncConfig::default()
    } else {
        let json = match read_cstr(config_json) {
            Ok(s) => s,
            Err(e) => return e,
        };
        match serde_json::from_str::<SyncConfig>(json) {
            Ok(c) => c,
            Err(e) => {
                warn!("invalid sync config: {e}");
                return LittleLemonError::JsonError;
            }
        }
    };

    init_core(path, config)
}}

/// Opens the stores, builds the runtime and wires sync and browsing together.
fn init_core(path: &str, config: SyncConfig) -> LittleLemonError {
    let in_memory = path == ":memory:";

    let menu_store = if in_memory {
        MenuStore::open_in_memory()
    } else {
        MenuStore::open(Path::new(path))
    };
    let menu_store = match menu_store {
        Ok(s) => s,
        Err(e) => {
            error!("failed to open menu store at {path}: {e}");
            return (&e).into();
        }
    };

    let profile_store = if in_memory {
        ProfileStore::open_in_memory()
    } else {
        ProfileStore::open(&Path::new(path).with_extension("prefs.db"))
    };
    let profile_store = match profile_store {
        Ok(s) => s,
        Err(e) => {
            error!("failed to open profile store: {e}");
            return (&e).into();
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("littlelemon-rt")
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to build runtime: {e}");
            return LittleLemonError::Unknown;
        }
    };

    let source = match HttpMenuSource::new(&config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("failed to build menu client: {e}");
            return LittleLemonError::Unknown;
        }
    };

    // The browser queries the cache right away, so the table must exist first.
    match menu_store.ensure_schema() {
        Ok(change) => debug!("menu schema at init: {change:?}"),
        Err(e) if e.is_unavailable() => {
            error!("menu store unavailable at init: {e}");
            return (&e).into();
        }
        Err(e) => warn!("menu schema setup failed, the next sync retries it: {e}"),
    }

    let query = MenuQuery::new(menu_store.clone());
    let browser = Arc::new(MenuBrowser::new(
        query.clone(),
        config.search_debounce(),
        runtime.handle().clone(),
    ));
    let coordinator = Arc::new(SyncCoordinator::new(
        menu_store.clone(),
        source,
        config.clone(),
    ));

    let mut handle = lock_handle();
    *handle = Some(LittleLemonHandle {
        menu_store,
        profile_store,
        query,
        browser,
        coordinator,
        sync_task: None,
        config,
        runtime,
    });

    info!("littlelemon initialized ({path})");
    LittleLemonError::Ok
}

/// Shuts down the runtime, closes the stores and frees resources.
#[unsafe(no_mangle)]
pub extern "C" fn littlelemon_shutdown() {
    let taken = lock_handle().take();
    if let Some(handle) = taken {
        if let Some(task) = &handle.sync_task {
            task.abort();
        }
        handle.menu_store.close();
        drop(handle);
        info!("littlelemon shut down");
    }
}

/// Returns the library version as a string.
///
/// # Safety
/// - The returned string is statically allocated and must not be freed.
#[unsafe(no_mangle)]
pub extern "C" fn littlelemon_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

/// Frees a string allocated by this library.
///
/// # Safety
/// - `s` must be a string allocated by this library, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn littlelemon_free_string(s: *mut c_char) { unsafe {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}}

// ============================================================================
// Sync Functions
// ============================================================================

/// Starts the startup menu sync in the background and returns immediately.
///
/// The home screen view is refreshed once the sync finishes.
#[unsafe(no_mangle)]
pub extern "C" fn littlelemon_sync_start() -> LittleLemonError {
    with_handle(|h| {
        if h.sync_task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("sync already running");
            return LittleLemonError::SyncAlreadyRunning;
        }

        let coordinator = Arc::clone(&h.coordinator);
        let browser = Arc::clone(&h.browser);
        h.sync_task = Some(h.runtime.spawn(async move {
            match coordinator.initialize_sync().await {
                Ok(status) => debug!("background sync finished: {:?}", status.state),
                Err(e) => error!("background sync aborted: {e}"),
            }
            if let Err(e) = browser.refresh() {
                warn!("menu refresh after sync failed: {e}");
            }
        }));
        LittleLemonError::Ok
    })
}

/// Runs the menu sync to completion.
///
/// Returns `Ok` when the cache is usable (refreshed, or left as is because
/// the remote menu was empty), `SyncFailed` when the sync could not refresh
/// the cache and the previous one is being served.
///
/// The global handle is not held while the sync runs, so other calls keep
/// working during the fetch.
#[unsafe(no_mangle)]
pub extern "C" fn littlelemon_sync_run() -> LittleLemonError {
    let parts = lock_handle().as_ref().map(|h| {
        (
            Arc::clone(&h.coordinator),
            Arc::clone(&h.browser),
            h.runtime.handle().clone(),
        )
    });
    let Some((coordinator, browser, runtime)) = parts else {
        return LittleLemonError::NotInitialized;
    };

    let result = runtime.block_on(coordinator.initialize_sync());
    if let Err(e) = browser.refresh() {
        warn!("menu refresh after sync failed: {e}");
    }
    match result {
        Ok(status) if status.state == SyncState::SyncFailed => LittleLemonError::SyncFailed,
        Ok(_) => LittleLemonError::Ok,
        Err(e) => (&e).into(),
    }
}

/// Gets the latest sync status.
///
/// # Safety
/// - `out_json` must be a valid pointer.
/// - The returned string must be freed with `littlelemon_free_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn littlelemon_sync_status(out_json: *mut *mut c_char) -> LittleLemonError { unsafe {
    if out_json.is_null() {
        return LittleLemonError::NullPointer;
    }

    #[derive(Serialize)]
    struct SyncStatusDto {
        #[serde(flatten)]
        status: littlelemon_sync::SyncStatus,
        degraded: bool,
        menu_url: String,
    }

    with_handle(|h| {
        let status = h.coordinator.status();
        let dto = SyncStatusDto {
            degraded: status.is_degraded(),
            status,
            menu_url: h.config.menu_url.clone(),
        };
        write_json(&dto, out_json)
    })
}}
