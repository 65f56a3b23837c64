//! Testing utilities for the raid roster workspace
//!
//! Shared fixtures, a recording surface and a pre-wired engine harness.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use roster_core::{
    Action, ActionEnvelope, DeliveryError, ManualClock, Notification, PanelSurface,
    RosterConfig, RosterEngine, RosterService, RosterStore, Snapshot,
};
use roster_model::{Entry, Panel, PanelId, PanelMeta, PromotionPolicy, Role};
use roster_text::RenderedPanel;
use std::sync::Arc;
use std::time::Duration;

/// Fixed starting instant for simulated clocks (2025-11-01 12:26:40 UTC)
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_762_000_000, 0).unwrap()
}

pub fn entry(id: &str) -> Entry {
    Entry::primary(id.into(), Role::Mage, 5).unwrap()
}

pub fn alt(id: &str) -> Entry {
    Entry::secondary(id.into(), Role::Archer, 3).unwrap()
}

/// Panel led by `"lead"` with primary entries for the given ids
pub fn panel_with(capacity: i64, active: &[&str], waitlist: &[&str]) -> Panel {
    let meta = PanelMeta::new("lead".into(), "Dymacho")
        .with_requirements("SP 8+")
        .with_schedule("11.11.2025", "21:00", "1h");
    let mut panel = Panel::new(capacity, meta);
    panel.active.extend(active.iter().map(|id| entry(id)));
    panel.waitlist.extend(waitlist.iter().map(|id| entry(id)));
    panel
}

pub fn ids(list: &[Entry]) -> Vec<&str> {
    list.iter().map(|e| e.participant_id.as_str()).collect()
}

pub fn envelope(reference: impl ToString, actor: &str, action: Action) -> ActionEnvelope {
    ActionEnvelope {
        panel_or_message_id: reference.to_string(),
        actor_id: actor.into(),
        action,
        snapshot: None,
    }
}

pub fn snapshot(text: impl Into<String>, channel: &str, message: &str) -> Snapshot {
    Snapshot {
        text: text.into(),
        channel_id: Some(channel.into()),
        message_id: Some(message.into()),
        guild_id: None,
    }
}

/// Surface that keeps everything it is sent
#[derive(Debug, Default)]
pub struct RecordingSurface {
    refreshes: Mutex<Vec<RenderedPanel>>,
    notifications: Mutex<Vec<Notification>>,
    failing: Mutex<Option<DeliveryError>>,
    stall: Mutex<Option<Duration>>,
}

impl RecordingSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail every later delivery with `error`
    pub fn fail_with(&self, error: DeliveryError) {
        *self.failing.lock() = Some(error);
    }

    /// Sleep this long inside every later delivery
    pub fn stall_for(&self, delay: Duration) {
        *self.stall.lock() = Some(delay);
    }

    pub fn refreshes(&self) -> Vec<RenderedPanel> {
        self.refreshes.lock().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.notifications.lock().iter().map(Notification::text).collect()
    }

    pub fn clear(&self) {
        self.refreshes.lock().clear();
        self.notifications.lock().clear();
    }

    async fn gate(&self) -> Result<(), DeliveryError> {
        let stall = *self.stall.lock();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        match self.failing.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PanelSurface for RecordingSurface {
    async fn refresh(&self, _panel: &Panel, rendered: &RenderedPanel) -> Result<(), DeliveryError> {
        self.gate().await?;
        self.refreshes.lock().push(rendered.clone());
        Ok(())
    }

    async fn announce(&self, _panel: &Panel, notification: &Notification) -> Result<(), DeliveryError> {
        self.gate().await?;
        self.notifications.lock().push(notification.clone());
        Ok(())
    }
}

/// Engine and service over an in-memory store, a manual clock and a
/// recording surface
#[derive(Debug, Clone)]
pub struct Harness {
    pub config: RosterConfig,
    pub store: Arc<RosterStore>,
    pub clock: Arc<ManualClock>,
    pub surface: Arc<RecordingSurface>,
    pub engine: RosterEngine,
    pub service: RosterService,
}

impl Harness {
    pub fn new(policy: PromotionPolicy) -> Self {
        Self::with_config(
            RosterConfig::default()
                .with_promotion_policy(policy)
                .with_utc_offset_minutes(Some(60)),
        )
    }

    pub fn with_config(config: RosterConfig) -> Self {
        let store = Arc::new(RosterStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let surface = RecordingSurface::new();
        let engine = RosterEngine::new(Arc::clone(&store), &config)
            .with_clock(clock.clone())
            .with_surface(surface.clone());
        let service = RosterService::new(engine.clone(), &config);
        Self {
            config,
            store,
            clock,
            surface,
            engine,
            service,
        }
    }

    pub fn insert(&self, panel: Panel) -> PanelId {
        let id = panel.panel_id;
        self.store.insert(panel);
        id
    }

    pub fn panel(&self, id: &PanelId) -> Panel {
        self.store.get(id).unwrap()
    }

    pub fn advance(&self, by: chrono::Duration) -> DateTime<Utc> {
        self.clock.advance(by);
        self.engine.now()
    }
}
