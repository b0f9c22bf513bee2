use async_trait::async_trait;
use littlelemon_storage::{MenuFilter, MenuStore, NewMenuItem};
use littlelemon_sync::{
    HttpMenuSource, MenuQuery, MenuSource, SyncConfig, SyncCoordinator, SyncError, SyncResult,
    SyncState,
};
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Replays a fixed sequence of fetch outcomes; an empty script yields an empty menu.
struct ScriptedSource {
    script: Mutex<VecDeque<SyncResult<Vec<NewMenuItem>>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(script: impl IntoIterator<Item = SyncResult<Vec<NewMenuItem>>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MenuSource for ScriptedSource {
    async fn fetch_menu(&self) -> SyncResult<Vec<NewMenuItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Drops the menu table while the fetch is in flight, so the replace that
/// follows has nothing to write into.
struct TableDroppingSource {
    store: MenuStore,
}

#[async_trait]
impl MenuSource for TableDroppingSource {
    async fn fetch_menu(&self) -> SyncResult<Vec<NewMenuItem>> {
        self.store.drop_schema().unwrap();
        Ok(remote_menu())
    }
}

fn remote_menu() -> Vec<NewMenuItem> {
    vec![
        NewMenuItem::new("Greek Salad", "starters", 12.99),
        NewMenuItem::new("Grilled Fish", "mains", 20.0),
        NewMenuItem::new("Lemonade", "drinks", 3.5),
    ]
}

fn fetch_error() -> SyncResult<Vec<NewMenuItem>> {
    Err(SyncError::Fetch("connection reset".into()))
}

fn seeded_store() -> MenuStore {
    let store = MenuStore::open_in_memory().unwrap();
    store.ensure_schema().unwrap();
    store
        .replace_all(&[
            NewMenuItem::new("Bruschetta", "starters", 5.99),
            NewMenuItem::new("Lemon Dessert", "desserts", 6.99),
        ])
        .unwrap();
    store
}

fn names(store: &MenuStore) -> Vec<String> {
    store
        .query_filtered(&MenuFilter::default())
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect()
}

fn coordinator(store: &MenuStore, source: Arc<ScriptedSource>) -> SyncCoordinator {
    SyncCoordinator::new(store.clone(), source, SyncConfig::default())
}

#[tokio::test]
async fn initial_status_is_idle() {
    let store = MenuStore::open_in_memory().unwrap();
    let coord = coordinator(&store, ScriptedSource::new(Vec::new()));
    let status = coord.status();
    assert_eq!(status.state, SyncState::Idle);
    assert!(!status.is_degraded());
}

#[tokio::test]
async fn successful_sync_replaces_cache() {
    let store = seeded_store();
    let source = ScriptedSource::new([Ok(remote_menu())]);
    let coord = coordinator(&store, source.clone());

    let status = coord.initialize_sync().await.unwrap();

    assert_eq!(status.state, SyncState::Synced);
    assert_eq!(status.items_inserted, 3);
    assert_eq!(status.items_failed, 0);
    assert_eq!(status.attempts, 1);
    assert!(status.last_synced_at.is_some());
    assert!(!status.is_degraded());
    assert_eq!(names(&store), ["Greek Salad", "Grilled Fish", "Lemonade"]);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn sync_creates_schema_on_fresh_store() {
    let store = MenuStore::open_in_memory().unwrap();
    let coord = coordinator(&store, ScriptedSource::new([Ok(remote_menu())]));

    coord.initialize_sync().await.unwrap();
    assert_eq!(store.count().unwrap(), 3);
}

#[tokio::test]
async fn empty_remote_menu_keeps_cache() {
    let store = seeded_store();
    let before = store.query_filtered(&MenuFilter::default()).unwrap();
    let coord = coordinator(&store, ScriptedSource::new([Ok(Vec::new())]));

    let status = coord.initialize_sync().await.unwrap();

    assert_eq!(status.state, SyncState::SchemaReady);
    assert_eq!(status.last_synced_at, None);
    // Same ids: the rows were never deleted and re-inserted.
    assert_eq!(store.query_filtered(&MenuFilter::default()).unwrap(), before);
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_leaves_cache_untouched() {
    let store = seeded_store();
    let source = ScriptedSource::new([fetch_error(), fetch_error()]);
    let coord = coordinator(&store, source.clone());

    let status = coord.initialize_sync().await.unwrap();

    assert_eq!(status.state, SyncState::SyncFailed);
    assert!(status.is_degraded());
    assert!(status.last_error.unwrap().contains("connection reset"));
    assert_eq!(names(&store), ["Bruschetta", "Lemon Dessert"]);
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_is_retried_once() {
    let store = MenuStore::open_in_memory().unwrap();
    let source = ScriptedSource::new([fetch_error(), Ok(remote_menu())]);
    let coord = coordinator(&store, source.clone());

    let started = tokio::time::Instant::now();
    let status = coord.initialize_sync().await.unwrap();

    assert_eq!(status.state, SyncState::Synced);
    assert_eq!(status.attempts, 2);
    assert_eq!(source.calls(), 2);
    assert!(started.elapsed() >= SyncConfig::default().retry_backoff(0));
}

#[tokio::test(start_paused = true)]
async fn retries_follow_config() {
    let store = MenuStore::open_in_memory().unwrap();
    let source = ScriptedSource::new([fetch_error(), fetch_error(), fetch_error(), fetch_error()]);
    let config = SyncConfig {
        max_fetch_retries: 3,
        ..SyncConfig::default()
    };
    let coord = SyncCoordinator::new(store.clone(), source.clone(), config);

    let status = coord.initialize_sync().await.unwrap();
    assert_eq!(status.state, SyncState::SyncFailed);
    assert_eq!(status.attempts, 4);
    assert_eq!(source.calls(), 4);
}

#[tokio::test]
async fn format_error_is_not_retried() {
    let store = seeded_store();
    let source = ScriptedSource::new([Err(SyncError::Format("missing `menu` field".into()))]);
    let coord = coordinator(&store, source.clone());

    let status = coord.initialize_sync().await.unwrap();
    assert_eq!(status.state, SyncState::SyncFailed);
    assert_eq!(source.calls(), 1);
    assert_eq!(store.count().unwrap(), 2);
}

#[tokio::test]
async fn closed_store_fails_before_fetch() {
    let store = MenuStore::open_in_memory().unwrap();
    store.close();
    let source = ScriptedSource::new([Ok(remote_menu())]);
    let coord = coordinator(&store, source.clone());

    let err = coord.initialize_sync().await.unwrap_err();
    assert!(matches!(err, SyncError::StoreUnavailable(_)), "got {err:?}");
    assert_eq!(coord.status().state, SyncState::SyncFailed);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn failed_replace_is_reported_as_degraded() {
    let store = seeded_store();
    let source = Arc::new(TableDroppingSource {
        store: store.clone(),
    });
    let coord = SyncCoordinator::new(store.clone(), source, SyncConfig::default());

    let status = coord.initialize_sync().await.unwrap();

    assert_eq!(status.state, SyncState::SyncFailed);
    assert!(status.is_degraded());
    assert!(status.last_error.unwrap().contains("no such table"));
    assert_eq!(status.last_synced_at, None);
    assert_eq!(status.items_inserted, 0);
}

#[tokio::test]
async fn schema_failure_degrades_without_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("menu.db");
    {
        // An index already owns the name `menu`, so the table cannot be created.
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute_batch("CREATE TABLE other (x); CREATE INDEX menu ON other (x);")
            .unwrap();
    }
    let store = MenuStore::open(&db_path).unwrap();
    let source = ScriptedSource::new([Ok(remote_menu())]);
    let coord = coordinator(&store, source.clone());

    let status = coord.initialize_sync().await.unwrap();

    assert_eq!(status.state, SyncState::SyncFailed);
    assert!(status.is_degraded());
    assert!(status.last_error.unwrap().contains("menu"));
    assert_eq!(source.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn rerun_after_failure_recovers() {
    let store = MenuStore::open_in_memory().unwrap();
    let source = ScriptedSource::new([fetch_error(), fetch_error(), Ok(remote_menu())]);
    let coord = coordinator(&store, source);

    assert_eq!(coord.initialize_sync().await.unwrap().state, SyncState::SyncFailed);
    let status = coord.initialize_sync().await.unwrap();
    assert_eq!(status.state, SyncState::Synced);
    assert_eq!(status.last_error, None);
    assert_eq!(status.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn last_sync_time_survives_later_failure() {
    let store = MenuStore::open_in_memory().unwrap();
    let source = ScriptedSource::new([Ok(remote_menu()), fetch_error(), fetch_error()]);
    let coord = coordinator(&store, source);

    let synced_at = coord.initialize_sync().await.unwrap().last_synced_at;
    assert!(synced_at.is_some());

    let status = coord.initialize_sync().await.unwrap();
    assert_eq!(status.state, SyncState::SyncFailed);
    assert_eq!(status.last_synced_at, synced_at);
}

#[tokio::test]
async fn subscribers_see_final_state() {
    let store = MenuStore::open_in_memory().unwrap();
    let coord = Arc::new(coordinator(&store, ScriptedSource::new([Ok(remote_menu())])));
    let mut rx = coord.subscribe();

    coord.spawn_sync().await.unwrap();

    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().state, SyncState::Synced);
    assert_eq!(store.count().unwrap(), 3);
}

// ── End to end ───────────────────────────────────────────────────

#[tokio::test]
async fn http_sync_then_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/capstone.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "menu": [
                { "name": "Greek Salad", "price": "12.99", "category": "starters", "image": "greekSalad.jpg" },
                { "name": "Lemon Dessert", "price": "6.99", "category": "desserts", "image": "lemonDessert.jpg" },
                { "name": "Grilled Fish", "price": "20.00", "category": "mains" },
                { "name": "Lemonade", "price": "abc", "category": "drinks" }
            ]
        })))
        .mount(&server)
        .await;

    let config = SyncConfig {
        menu_url: format!("{}/capstone.json", server.uri()),
        ..SyncConfig::default()
    };
    let store = MenuStore::open_in_memory().unwrap();
    let source = Arc::new(HttpMenuSource::new(&config).unwrap());
    let coord = SyncCoordinator::new(store.clone(), source, config);

    let status = coord.initialize_sync().await.unwrap();
    assert_eq!(status.state, SyncState::Synced);
    assert_eq!(status.items_inserted, 4);

    let query = MenuQuery::new(store);
    let drinks = query.query_by(["drinks"], "").unwrap();
    assert_eq!(drinks.len(), 1);
    assert_eq!(drinks[0].price, 0.0);

    let greek = query.query_by(Vec::<String>::new(), "greek").unwrap();
    assert_eq!(greek.len(), 1);
    assert_eq!(greek[0].name, "Greek Salad");

    assert_eq!(
        query.list_categories().unwrap(),
        ["starters", "desserts", "mains", "drinks"]
    );
}
