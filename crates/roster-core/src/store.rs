//! In-memory panel store
//!
//! Authoritative state for every panel, keyed by [`PanelId`], with a
//! secondary index from the rendered message id. Callers mutate panels only
//! through [`crate::engine::RosterEngine`], which holds the panel lock around
//! each read-modify-write.

use dashmap::DashMap;
use roster_model::{MessageId, Panel, PanelId};

/// Panel records plus message-id index
#[derive(Debug, Default)]
pub struct RosterStore {
    panels: DashMap<PanelId, Panel>,
    by_message: DashMap<MessageId, PanelId>,
}

impl RosterStore {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a panel, keeping the message index in sync
    pub fn insert(&self, panel: Panel) -> Option<Panel> {
        let id = panel.panel_id;
        let message_id = panel.message_id().cloned();
        let previous = self.panels.insert(id, panel);

        if let Some(old) = previous.as_ref().and_then(Panel::message_id) {
            if message_id.as_ref() != Some(old) {
                self.by_message.remove_if(old, |_, owner| *owner == id);
            }
        }
        if let Some(message_id) = message_id {
            self.by_message.insert(message_id, id);
        }
        previous
    }

    /// Copy of a panel
    #[must_use]
    pub fn get(&self, id: &PanelId) -> Option<Panel> {
        self.panels.get(id).map(|p| p.clone())
    }

    #[must_use]
    pub fn contains(&self, id: &PanelId) -> bool {
        self.panels.contains_key(id)
    }

    /// Remove a panel and its index entry
    pub fn remove(&self, id: &PanelId) -> Option<Panel> {
        let (_, panel) = self.panels.remove(id)?;
        if let Some(message_id) = panel.message_id() {
            self.by_message.remove_if(message_id, |_, owner| owner == id);
        }
        Some(panel)
    }

    /// Resolve a panel id or a rendered message id
    #[must_use]
    pub fn resolve(&self, reference: &str) -> Option<PanelId> {
        if let Ok(id) = reference.parse::<PanelId>() {
            if self.panels.contains_key(&id) {
                return Some(id);
            }
        }
        self.by_message
            .get(&MessageId::from(reference.trim()))
            .map(|id| *id)
    }

    /// Ids of every panel, sorted for deterministic iteration
    #[must_use]
    pub fn ids(&self) -> Vec<PanelId> {
        let mut ids: Vec<PanelId> = self.panels.iter().map(|p| *p.key()).collect();
        ids.sort();
        ids
    }

    /// Copies of every panel, in id order
    #[must_use]
    pub fn snapshot(&self) -> Vec<Panel> {
        self.ids().iter().filter_map(|id| self.get(id)).collect()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.panels.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }
}
