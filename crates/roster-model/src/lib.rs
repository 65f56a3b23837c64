//! Roster Model
//!
//! Domain types and the pure state machine behind a signup panel.
//!
//! # Core Concepts
//!
//! - [`Panel`]: one scheduled event with a capacity-bounded active roster and
//!   an overflow waitlist
//! - [`Entry`]: a single registration (role, tier, primary or secondary)
//! - [`PendingPromotion`]: a delayed waitlist → active move
//! - [`VacancyRules`]: how vacancies are filled (immediately or after a delay)
//!
//! Every transition here is synchronous and side-effect free. Locking,
//! persistence and notifications live in `roster-core`.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use roster_model::{Entry, Panel, PanelMeta, ParticipantId, Placement, Role, VacancyRules};
//!
//! let meta = PanelMeta::new(ParticipantId::from("1"), "Raid");
//! let mut panel = Panel::new(1, meta);
//! let rules = VacancyRules::default();
//!
//! let first = Entry::primary(ParticipantId::from("10"), Role::Mage, 5).unwrap();
//! let second = Entry::primary(ParticipantId::from("11"), Role::Martial, 7).unwrap();
//!
//! assert_eq!(panel.join(first, &rules, Utc::now()).unwrap().placement, Placement::Active);
//! assert_eq!(panel.join(second, &rules, Utc::now()).unwrap().placement, Placement::Waitlist);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod entry;
mod error;
mod ids;
mod panel;
pub mod roster;

pub use entry::{Entry, Role};
pub use error::{InvariantViolation, RosterOpError, ValidationError};
pub use ids::{ChannelId, GuildId, MessageId, PanelId, ParticipantId};
pub use panel::{
    clamp_capacity, Panel, PanelLocation, PanelMeta, PendingPromotion, DEFAULT_CAPACITY,
    DEFAULT_SECONDARY_LIMIT, MAX_CAPACITY, MIN_CAPACITY,
};
pub use roster::{
    AdminPromoteOutcome, CancelReason, CancelledIntent, DemoteOutcome, JoinOutcome, Placement,
    PromotionPolicy, ResizeOutcome, VacancyOutcome, VacancyRules, WithdrawOutcome, WithdrawScope,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
