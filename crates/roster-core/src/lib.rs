//! Roster Core
//!
//! The live side of the roster: shared state, serialisation of mutations,
//! timers, durability and the inbound action surface.
//!
//! # Components
//!
//! - [`RosterStore`]: in-memory panels keyed by panel id and message id
//! - [`PanelLocks`]: keyed FIFO mutex, one per panel
//! - [`RosterEngine`]: locked, working-copy mutations with side effects
//! - [`PromotionScheduler`]: applies due promotions and closes signups
//! - [`Persister`]: debounced JSON snapshots, [`restore`] on startup
//! - [`RosterService`]: action envelopes, message-id lookup and recovery
//!
//! # Example
//!
//! ```rust,no_run
//! use roster_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), RosterError> {
//! let config = RosterConfig::default();
//! let engine = RosterEngine::new(Arc::new(RosterStore::new()), &config);
//! let service = RosterService::new(engine, &config);
//!
//! let created = service
//!     .create_panel(NewPanel {
//!         leader_id: "7".into(),
//!         title: "Dymacho".into(),
//!         requirements: String::new(),
//!         capacity: 15,
//!         date_text: "11.11.2025".into(),
//!         time_text: "21:00".into(),
//!         duration_text: "2h".into(),
//!     })
//!     .await?;
//! println!("{}", created.panel_id);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod lock;
pub mod persistence;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod surface;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RosterConfig;
pub use engine::{CreatedPanel, EngineSettings, NewPanel, RosterEngine, TickOutcome};
pub use error::{ConfigError, PersistError, RosterError};
pub use lock::{PanelGuard, PanelLocks};
pub use persistence::{
    decode_store, encode_store, restore, JsonFileStorage, MemoryStorage, PanelRecord,
    PanelStorage, Persister, RestoreReport,
};
pub use scheduler::{PromotionScheduler, SchedulerHandle, TickReport};
pub use service::{Action, ActionEnvelope, ActionOutcome, ActionReply, RosterService, Snapshot};
pub use store::RosterStore;
pub use surface::{DeliveryError, LogSurface, Notification, NullSurface, PanelSurface};

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Action, ActionEnvelope, ActionReply, Clock, NewPanel, PanelSurface, Persister,
        PromotionScheduler, RosterConfig, RosterEngine, RosterError, RosterService, RosterStore,
    };
    pub use roster_model::{PanelId, ParticipantId, Placement, PromotionPolicy, Role, WithdrawScope};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
