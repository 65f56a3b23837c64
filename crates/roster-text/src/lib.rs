//! Roster Text
//!
//! Everything that turns roster state into text and back:
//! - [`schedule`]: free-text Polish date/time → start instant
//! - [`render`]: [`roster_model::Panel`] → [`RenderedPanel`]
//! - [`recovery`]: rendered text → [`RecoveredPanel`] when the stored record is gone
//!
//! Rendering and recovery share the marker vocabulary in [`render`], so a
//! panel rendered here can always be reconstructed here.

#![warn(unreachable_pub)]

mod error;
pub mod recovery;
pub mod render;
pub mod schedule;

pub use error::{RecoveryError, ScheduleError};
pub use recovery::{reconstruct, RecoveredPanel, RecoveryContext};
pub use render::{broadcast_digest, entry_line, render_panel, RenderedPanel};
pub use schedule::{humanize_delta, parse_start, resolve_start, ScheduleZone};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
