//! Durable snapshot/restore of the roster store
//!
//! Layout: one JSON object keyed by panel id, each value a [`PanelRecord`].
//! Records written by the older bot (`main`, `reserve`, `raidName`, `userId`,
//! `cls`, `sp`, `isAlt`, `scheduledAt`, ...) are accepted on load.
//!
//! Writes are debounced by [`Persister`]: every mutation re-arms a quiet
//! period and only the last state of a burst reaches storage.
//! [`JsonFileStorage`] writes a sibling temp file and renames it over the
//! target.

use crate::error::PersistError;
use crate::store::RosterStore;
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use roster_model::{ChannelId, Entry, GuildId, MessageId, Panel, PanelId, PanelLocation, PanelMeta};
use roster_text::{resolve_start, ScheduleZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

/// Stored form of one panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelRecord {
    #[serde(default)]
    pub panel_id: Option<PanelId>,
    pub capacity: i64,
    #[serde(default, alias = "main")]
    pub active: Vec<Entry>,
    #[serde(default, alias = "reserve")]
    pub waitlist: Vec<Entry>,
    pub meta: PanelMeta,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

impl From<&Panel> for PanelRecord {
    fn from(panel: &Panel) -> Self {
        let location = panel.location.as_ref();
        Self {
            panel_id: Some(panel.panel_id),
            capacity: i64::from(panel.capacity),
            active: panel.active.clone(),
            waitlist: panel.waitlist.clone(),
            meta: panel.meta.clone(),
            channel_id: location.map(|l| l.channel_id.clone()),
            message_id: location.map(|l| l.message_id.clone()),
            guild_id: location.and_then(|l| l.guild_id.clone()),
        }
    }
}

impl PanelRecord {
    /// Rebuild the panel; `key` is the map key the record was stored under
    ///
    /// Returns `None` when neither the record nor the key holds a panel id.
    #[must_use]
    pub fn into_panel(self, key: &str) -> Option<Panel> {
        let panel_id = self.panel_id.or_else(|| key.parse().ok())?;
        let mut panel = Panel::with_id(panel_id, self.capacity, self.meta);
        panel.active = self.active;
        panel.waitlist = self.waitlist;
        if let (Some(channel_id), Some(message_id)) = (self.channel_id, self.message_id) {
            panel.attach_location(PanelLocation {
                channel_id,
                message_id,
                guild_id: self.guild_id,
            });
        }
        Some(panel)
    }
}

/// Encode panels as the stored JSON document
///
/// # Errors
/// - `PersistError::Encode` if serialization fails
pub fn encode_store(panels: &[Panel]) -> Result<String, PersistError> {
    let document: BTreeMap<String, PanelRecord> = panels
        .iter()
        .map(|p| (p.panel_id.to_string(), PanelRecord::from(p)))
        .collect();
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Decode the stored JSON document
///
/// Records that cannot be read are skipped and counted in the second value.
///
/// # Errors
/// - `PersistError::Corrupt` if the document is not a JSON object
pub fn decode_store(text: &str) -> Result<(Vec<Panel>, usize), PersistError> {
    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(text).map_err(|e| PersistError::Corrupt(e.to_string()))?;

    let mut panels = Vec::with_capacity(raw.len());
    let mut skipped = 0;
    for (key, value) in raw {
        let panel = serde_json::from_value::<PanelRecord>(value)
            .map_err(|e| e.to_string())
            .and_then(|record| record.into_panel(&key).ok_or_else(|| "no panel id".to_string()));
        match panel {
            Ok(panel) => panels.push(panel),
            Err(reason) => {
                tracing::warn!(key = %key, %reason, "Skipping unreadable panel record");
                skipped += 1;
            }
        }
    }
    Ok((panels, skipped))
}

/// Raw document storage
#[async_trait]
pub trait PanelStorage: Send + Sync + std::fmt::Debug {
    /// Read the stored document; `None` if nothing has been stored yet
    async fn read(&self) -> Result<Option<String>, PersistError>;

    /// Replace the stored document
    async fn write(&self, document: &str) -> Result<(), PersistError>;
}

/// Single JSON file, replaced atomically via rename
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn ensure_parent(&self) -> Result<(), PersistError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PersistError::io_error(parent, e)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl PanelStorage for JsonFileStorage {
    async fn read(&self) -> Result<Option<String>, PersistError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.ensure_parent().await?;
                tokio::fs::write(&self.path, "{}")
                    .await
                    .map_err(|e| PersistError::io_error(&self.path, e))?;
                tracing::info!(path = %self.path.display(), "Created empty store");
                Ok(None)
            }
            Err(e) => Err(PersistError::io_error(&self.path, e)),
        }
    }

    async fn write(&self, document: &str) -> Result<(), PersistError> {
        self.ensure_parent().await?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, document)
            .await
            .map_err(|e| PersistError::io_error(&temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| PersistError::io_error(&self.path, e))
    }
}

/// In-memory storage for tests and offline replay
#[derive(Debug, Default)]
pub struct MemoryStorage {
    document: SyncMutex<Option<String>>,
    writes: SyncMutex<usize>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-filled with a document
    #[must_use]
    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            document: SyncMutex::new(Some(document.into())),
            writes: SyncMutex::new(0),
        }
    }

    /// Last written document
    #[must_use]
    pub fn document(&self) -> Option<String> {
        self.document.lock().clone()
    }

    /// Number of completed writes
    #[must_use]
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

#[async_trait]
impl PanelStorage for MemoryStorage {
    async fn read(&self) -> Result<Option<String>, PersistError> {
        Ok(self.document())
    }

    async fn write(&self, document: &str) -> Result<(), PersistError> {
        *self.document.lock() = Some(document.to_string());
        *self.writes.lock() += 1;
        Ok(())
    }
}

/// Summary of a startup restore
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub loaded: usize,
    /// Records that could not be read
    pub skipped: usize,
    /// Entries dropped while repairing loaded panels
    pub repaired_entries: usize,
    /// Start instants recomputed from schedule text
    pub recomputed_starts: usize,
    /// Whole document was unreadable; the store started empty
    pub corrupt: bool,
}

/// Load every stored panel into `store`
///
/// Never fails: missing storage yields an empty store, and storage that
/// cannot be read or decoded is logged, flagged as `corrupt` and also yields
/// an empty store. Loaded panels are normalised and get their start instant
/// recomputed when it is missing.
pub async fn restore(
    store: &RosterStore,
    storage: &dyn PanelStorage,
    secondary_limit: usize,
    zone: ScheduleZone,
) -> RestoreReport {
    let mut report = RestoreReport::default();
    let text = match storage.read().await {
        Ok(Some(text)) => text,
        Ok(None) => return report,
        Err(e) => {
            tracing::warn!(error = %e, "Stored panels unreadable, starting empty");
            report.corrupt = true;
            return report;
        }
    };

    let (panels, skipped) = match decode_store(&text) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::warn!(error = %e, "Stored panels undecodable, starting empty");
            report.corrupt = true;
            return report;
        }
    };
    report.skipped = skipped;

    for mut panel in panels {
        let dropped = panel.normalize(secondary_limit);
        if !dropped.is_empty() {
            tracing::warn!(panel_id = %panel.panel_id, dropped = dropped.len(), "Repaired loaded panel");
        }
        report.repaired_entries += dropped.len();

        if panel.meta.start_at.is_none() {
            if let Ok(start) = resolve_start(&panel.meta.date_text, &panel.meta.time_text, zone) {
                panel.meta.start_at = Some(start);
                report.recomputed_starts += 1;
            }
        }
        store.insert(panel);
        report.loaded += 1;
    }

    tracing::info!(
        loaded = report.loaded,
        skipped = report.skipped,
        "Restored panels"
    );
    report
}

struct PersisterInner {
    store: Arc<RosterStore>,
    storage: Arc<dyn PanelStorage>,
    debounce: Duration,
    notify: Notify,
    write_lock: Mutex<()>,
    task: SyncMutex<Option<JoinHandle<()>>>,
}

impl PersisterInner {
    async fn write_now(&self) -> Result<(), PersistError> {
        let _writing = self.write_lock.lock().await;
        let document = encode_store(&self.store.snapshot())?;
        self.storage.write(&document).await
    }
}

/// Debounced writer for the roster store
///
/// Cheap to clone; all clones share one background task.
#[derive(Clone)]
pub struct Persister {
    inner: Option<Arc<PersisterInner>>,
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("enabled", &self.inner.is_some())
            .field("debounce", &self.inner.as_ref().map(|i| i.debounce))
            .finish()
    }
}

impl Persister {
    /// Start the debounce task
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(store: Arc<RosterStore>, storage: Arc<dyn PanelStorage>, debounce: Duration) -> Self {
        let inner = Arc::new(PersisterInner {
            store,
            storage,
            debounce,
            notify: Notify::new(),
            write_lock: Mutex::new(()),
            task: SyncMutex::new(None),
        });
        let task = tokio::spawn(debounce_loop(Arc::clone(&inner)));
        *inner.task.lock() = Some(task);
        Self { inner: Some(inner) }
    }

    /// Persister that never writes
    #[must_use]
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Note that the store changed; a write follows after the quiet period
    pub fn mark_dirty(&self) {
        if let Some(inner) = &self.inner {
            inner.notify.notify_one();
        }
    }

    /// Write immediately
    ///
    /// # Errors
    /// Returns the storage error; the next mutation retries through the
    /// debounce path
    pub async fn flush(&self) -> Result<(), PersistError> {
        match &self.inner {
            Some(inner) => inner.write_now().await,
            None => Ok(()),
        }
    }

    /// Flush and stop the debounce task
    ///
    /// # Errors
    /// Returns the final flush error, if any
    pub async fn shutdown(&self) -> Result<(), PersistError> {
        let result = self.flush().await;
        if let Some(task) = self.inner.as_ref().and_then(|i| i.task.lock().take()) {
            task.abort();
        }
        result
    }
}

async fn debounce_loop(inner: Arc<PersisterInner>) {
    loop {
        inner.notify.notified().await;
        loop {
            tokio::select! {
                () = tokio::time::sleep(inner.debounce) => break,
                () = inner.notify.notified() => {}
            }
        }
        match inner.write_now().await {
            Ok(()) => tracing::debug!(panels = inner.store.len(), "Store saved"),
            Err(e) => {
                tracing::error!(error = %e, "Saving panels failed, retrying after the next quiet period");
                inner.notify.notify_one();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use roster_model::Role;

    const LEGACY: &str = r#"{
      "6f1c3c2e-8a43-4d3c-9f57-1b2a3c4d5e6f": {
        "panelId": "6f1c3c2e-8a43-4d3c-9f57-1b2a3c4d5e6f",
        "capacity": 2,
        "main": [
          {"userId": "1", "cls": "Mag", "sp": 5, "isAlt": false},
          {"userId": "2", "cls": "MSW", "sp": 9, "isAlt": false},
          {"userId": "3", "cls": "Łucznik", "sp": 1, "isAlt": false}
        ],
        "reserve": [],
        "meta": {
          "leaderId": "9",
          "leaderMention": "<@9>",
          "raidName": "Dymacho",
          "requirements": "—",
          "dateText": "11.11.2025",
          "timeText": "21:00",
          "duration": "1h",
          "closed": false,
          "pendingPromotions": [{"userId": "2", "scheduledAt": 1762891300000}]
        },
        "channelId": "c1",
        "messageId": "m1",
        "guildId": "g1"
      }
    }"#;

    #[tokio::test]
    async fn legacy_document_is_migrated_and_repaired() {
        let store = RosterStore::new();
        let storage = MemoryStorage::with_document(LEGACY);
        let zone = ScheduleZone::from_offset_minutes(Some(0));

        let report = restore(&store, &storage, 3, zone).await;
        assert_eq!(report.loaded, 1);
        assert_eq!(report.recomputed_starts, 1);

        let id = store.resolve("m1").unwrap();
        let panel = store.get(&id).unwrap();
        assert_eq!(panel.meta.title, "Dymacho");
        assert_eq!(panel.active.len(), 2);
        // overflow goes to the waitlist head; the promotion for an active participant is pruned
        assert_eq!(panel.waitlist[0].participant_id.as_str(), "3");
        assert_eq!(panel.active[1].role, Role::Martial);
        assert_eq!(panel.active[1].tier, 7);
        assert!(panel.meta.pending_promotions.is_empty());
        assert_eq!(
            panel.meta.start_at.map(|s| s.to_rfc3339()),
            Some("2025-11-11T21:00:00+00:00".to_string())
        );
    }

    #[tokio::test]
    async fn corrupt_document_starts_empty() {
        let store = RosterStore::new();
        let storage = MemoryStorage::with_document("{ not json");
        let report = restore(&store, &storage, 3, ScheduleZone::Local).await;
        assert!(report.corrupt);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unreadable_record_is_skipped() {
        let store = RosterStore::new();
        let storage = MemoryStorage::with_document(r#"{"not-a-uuid": {"capacity": 3}}"#);
        let report = restore(&store, &storage, 3, ScheduleZone::Local).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.loaded, 0);
    }

    #[test]
    fn record_keeps_location_and_schema() {
        let mut panel = Panel::new(4, PanelMeta::new("1".into(), "Raid"));
        panel.attach_location(PanelLocation {
            channel_id: "c".into(),
            message_id: "m".into(),
            guild_id: None,
        });
        let document = encode_store(&[panel.clone()]).unwrap();
        let json: serde_json::Value = serde_json::from_str(&document).unwrap();
        let record = &json[panel.panel_id.to_string()];
        assert_eq!(record["capacity"], 4);
        assert_eq!(record["messageId"], "m");
        assert!(record["meta"]["pendingPromotions"].is_array());

        let (decoded, skipped) = decode_store(&document).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(decoded, vec![panel]);
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_are_debounced() {
        let store = Arc::new(RosterStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let persister = Persister::spawn(Arc::clone(&store), storage.clone(), Duration::from_millis(500));

        for _ in 0..5 {
            store.insert(Panel::new(3, PanelMeta::new("1".into(), "Raid")));
            persister.mark_dirty();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(storage.writes(), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(storage.writes(), 1);
        let (panels, _) = decode_store(&storage.document().unwrap()).unwrap();
        assert_eq!(panels.len(), 5);
    }

    #[tokio::test]
    async fn file_storage_creates_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("raids.json");
        let storage = JsonFileStorage::new(&path);

        assert_eq!(storage.read().await.unwrap(), None);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");

        storage.write("{\"a\": 1}").await.unwrap();
        assert_eq!(storage.read().await.unwrap().as_deref(), Some("{\"a\": 1}"));
        assert!(!path.with_file_name("raids.json.tmp").exists());
    }
}
