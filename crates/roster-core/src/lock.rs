//! Per-panel mutation lock
//!
//! A keyed table of tokio mutexes. Tokio's mutex queues waiters fairly, so
//! mutations on one panel run in arrival order while other panels proceed in
//! parallel. Entries are created on first use and removed once no holder or
//! waiter remains.

use dashmap::DashMap;
use roster_model::PanelId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<()>>;

/// Keyed FIFO lock table
#[derive(Debug, Default, Clone)]
pub struct PanelLocks {
    slots: Arc<DashMap<PanelId, Slot>>,
}

impl PanelLocks {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `panel_id`
    ///
    /// The returned guard releases on drop, including on early return and
    /// unwinding.
    pub async fn acquire(&self, panel_id: PanelId) -> PanelGuard {
        let slot = self.slots.entry(panel_id).or_default().clone();
        let guard = slot.lock_owned().await;
        PanelGuard {
            panel_id,
            guard: Some(guard),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Number of panels with a holder or waiter
    #[inline]
    #[must_use]
    pub fn active(&self) -> usize {
        self.slots.len()
    }
}

/// Exclusive access to one panel
#[derive(Debug)]
pub struct PanelGuard {
    panel_id: PanelId,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Arc<DashMap<PanelId, Slot>>,
}

impl PanelGuard {
    #[inline]
    #[must_use]
    pub fn panel_id(&self) -> PanelId {
        self.panel_id
    }
}

impl Drop for PanelGuard {
    fn drop(&mut self) {
        // release first so the slot's only remaining owner can be the table
        drop(self.guard.take());
        self.slots
            .remove_if(&self.panel_id, |_, slot| Arc::strong_count(slot) == 1);
    }
}
