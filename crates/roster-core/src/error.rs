//! Error types for the roster engine
//!
//! Provides error handling for:
//! - Action failures surfaced to the caller ([`RosterError`])
//! - Storage faults ([`PersistError`], logged and retried)
//! - Configuration problems ([`ConfigError`])
//!
//! Delivery failures live in [`crate::surface::DeliveryError`]; they are
//! logged and never fail an action.

use roster_model::{PanelId, ParticipantId, RosterOpError, ValidationError};
use std::path::PathBuf;

/// Main roster error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    /// Input rejected before any mutation
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Secondary registration cap reached
    #[error("{participant} already holds the maximum of {limit} secondary entries")]
    CapacityLimit {
        participant: ParticipantId,
        limit: usize,
    },

    /// No panel under this id or message id
    #[error("panel not found: {0}")]
    PanelNotFound(String),

    /// Admin promote target is not waitlisted
    #[error("{0} is not on the waitlist")]
    NotInWaitlist(ParticipantId),

    /// Admin demote target is not on the active roster
    #[error("{0} is not on the active roster")]
    NotInActive(ParticipantId),

    /// Panel is missing and could not be rebuilt from the snapshot
    #[error("panel {reference} is not recoverable: {reason}")]
    NotRecoverable { reference: String, reason: String },

    /// Signups are closed
    #[error("signups for panel {0} are closed")]
    PanelClosed(PanelId),

    /// Only the leader may manage the panel
    #[error("{actor} is not the leader of panel {panel}")]
    PermissionDenied { actor: ParticipantId, panel: PanelId },
}

impl RosterError {
    /// Stable machine-readable kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::CapacityLimit { .. } => "capacity-limit",
            Self::PanelNotFound(_) | Self::NotInWaitlist(_) | Self::NotInActive(_) => "not-found",
            Self::NotRecoverable { .. } => "not-recoverable",
            Self::PanelClosed(_) => "panel-closed",
            Self::PermissionDenied { .. } => "permission-denied",
        }
    }

    /// Whether the error means something referenced does not exist
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == "not-found"
    }

    pub(crate) fn not_recoverable(reference: &str, reason: impl ToString) -> Self {
        Self::NotRecoverable {
            reference: reference.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<RosterOpError> for RosterError {
    fn from(err: RosterOpError) -> Self {
        match err {
            RosterOpError::Validation(e) => Self::Validation(e),
            RosterOpError::SecondaryLimit { participant, limit } => {
                Self::CapacityLimit { participant, limit }
            }
            RosterOpError::NotInWaitlist(p) => Self::NotInWaitlist(p),
            RosterOpError::NotInActive(p) => Self::NotInActive(p),
        }
    }
}

/// Storage faults
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Filesystem failure
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored document is not valid
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// Snapshot could not be encoded
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PersistError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Configuration problems
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML
    #[error("invalid config: {0}")]
    Parse(String),

    /// Environment override not understood
    #[error("invalid {var}='{value}': {reason}")]
    Env {
        var: &'static str,
        value: String,
        reason: String,
    },

    /// Value out of range
    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
