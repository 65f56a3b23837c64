//! Save through the debounced persister, then restore into a fresh store

use pretty_assertions::assert_eq;
use async_trait::async_trait;
use parking_lot::Mutex;
use roster_core::{
    decode_store, restore, JsonFileStorage, PanelStorage, PersistError, Persister, RosterConfig,
    RosterEngine, RosterStore,
};
use roster_model::{PromotionPolicy, Role, WithdrawScope};
use roster_test_utils::{ids, panel_with};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn mutations_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data").join("raids.json");
    let config = RosterConfig::default()
        .with_storage_path(&path)
        .with_promotion_policy(PromotionPolicy::Delayed)
        .with_save_debounce(Duration::from_millis(20));

    let store = Arc::new(RosterStore::new());
    let storage: Arc<dyn PanelStorage> = Arc::new(JsonFileStorage::new(&path));
    let persister = Persister::spawn(store.clone(), storage.clone(), config.save_debounce());
    let engine = RosterEngine::new(store.clone(), &config).with_persister(persister.clone());

    let panel = panel_with(1, &["a"], &["b"]);
    let id = panel.panel_id;
    store.insert(panel);
    engine.join(id, "c".into(), Role::Archer, 4, true).await.unwrap();
    engine.withdraw(id, "a".into(), WithdrawScope::Primary).await.unwrap();
    persister.shutdown().await.unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains(&id.to_string()));
    assert!(text.contains("pendingPromotions"));

    let reloaded = RosterStore::new();
    let report = restore(&reloaded, storage.as_ref(), config.secondary_limit, config.zone()).await;
    assert_eq!(report.loaded, 1);
    assert_eq!(report.recomputed_starts, 1);
    assert!(!report.corrupt);

    let before = store.get(&id).unwrap();
    let after = reloaded.get(&id).unwrap();
    assert_eq!(ids(&after.waitlist), vec!["b", "c"]);
    // stored with millisecond precision
    let pending = |p: &roster_model::Panel| -> Vec<(String, i64)> {
        p.meta
            .pending_promotions
            .iter()
            .map(|i| (i.participant_id.to_string(), i.due_at.timestamp_millis()))
            .collect()
    };
    assert_eq!(pending(&after), pending(&before));
    assert_eq!(pending(&after).len(), 1);
    assert!(before.meta.start_at.is_none());
    assert!(after.meta.start_at.is_some());
    assert_eq!(after.meta.title, "Dymacho");
}

#[tokio::test]
async fn first_start_creates_an_empty_store_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("raids.json");
    let storage = JsonFileStorage::new(&path);

    let store = RosterStore::new();
    let report = restore(&store, &storage, 3, RosterConfig::default().zone()).await;

    assert_eq!(report.loaded, 0);
    assert!(store.is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");
}

#[tokio::test]
async fn corrupt_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("raids.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = RosterStore::new();
    let report = restore(&store, &JsonFileStorage::new(&path), 3, RosterConfig::default().zone()).await;

    assert!(report.corrupt);
    assert!(store.is_empty());
}

#[tokio::test]
async fn non_utf8_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("raids.json");
    std::fs::write(&path, [0xff, 0xfe, b'{', b'}']).unwrap();

    let store = RosterStore::new();
    let report = restore(&store, &JsonFileStorage::new(&path), 3, RosterConfig::default().zone()).await;

    assert!(report.corrupt);
    assert_eq!(report.loaded, 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn directory_at_storage_path_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("raids.json");
    std::fs::create_dir(&path).unwrap();

    let store = RosterStore::new();
    let report = restore(&store, &JsonFileStorage::new(&path), 3, RosterConfig::default().zone()).await;

    assert!(report.corrupt);
    assert!(store.is_empty());
}

/// Storage whose first `failures` writes are rejected
#[derive(Debug, Default)]
struct FlakyStorage {
    failures: Mutex<usize>,
    attempts: Mutex<usize>,
    document: Mutex<Option<String>>,
}

impl FlakyStorage {
    fn failing(failures: usize) -> Self {
        Self {
            failures: Mutex::new(failures),
            ..Self::default()
        }
    }
}

#[async_trait]
impl PanelStorage for FlakyStorage {
    async fn read(&self) -> Result<Option<String>, PersistError> {
        Ok(self.document.lock().clone())
    }

    async fn write(&self, document: &str) -> Result<(), PersistError> {
        *self.attempts.lock() += 1;
        let mut failures = self.failures.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(PersistError::io_error("raids.json", std::io::Error::other("disk full")));
        }
        *self.document.lock() = Some(document.to_string());
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn failed_save_is_retried_after_the_next_quiet_period() {
    let store = Arc::new(RosterStore::new());
    let storage = Arc::new(FlakyStorage::failing(1));
    let persister = Persister::spawn(store.clone(), storage.clone(), Duration::from_millis(500));

    store.insert(panel_with(2, &["a"], &[]));
    persister.mark_dirty();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(*storage.attempts.lock(), 1);
    assert!(storage.document.lock().is_none());

    // changes made before the retry are part of it
    store.insert(panel_with(3, &["b"], &[]));
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(*storage.attempts.lock(), 2);

    let document = storage.document.lock().clone().unwrap();
    let (panels, skipped) = decode_store(&document).unwrap();
    assert_eq!(skipped, 0);
    assert_eq!(panels.len(), 2);
}
