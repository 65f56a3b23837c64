//! Error types for roster transitions
//!
//! Every error here is raised before the panel is touched, so a failed
//! transition never leaves partial state behind.

use crate::entry::Role;
use crate::ids::ParticipantId;

/// Input rejected before any mutation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Tier outside the role's range
    #[error("tier {tier} outside 1..={max} for {role}")]
    TierOutOfRange { role: Role, tier: u8, max: u8 },

    /// Role label not recognised
    #[error("unknown role: '{0}'")]
    UnknownRole(String),

    /// Date/time text could not be turned into an instant
    #[error("unparsable schedule: '{date}' '{time}'")]
    UnparsableSchedule { date: String, time: String },

    /// Required text field was blank
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

/// Errors from roster transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterOpError {
    /// Invalid input
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Secondary registration cap reached
    #[error("{participant} already holds {limit} secondary entries")]
    SecondaryLimit {
        participant: ParticipantId,
        limit: usize,
    },

    /// Admin promote target is not waitlisted
    #[error("{0} is not on the waitlist")]
    NotInWaitlist(ParticipantId),

    /// Admin demote target is not on the active roster
    #[error("{0} is not on the active roster")]
    NotInActive(ParticipantId),
}

/// Broken structural invariant, reported by [`crate::Panel::check_invariants`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("active roster holds {len} entries but capacity is {capacity}")]
    OverCapacity { len: usize, capacity: u8 },

    #[error("{0} holds more than one primary entry")]
    DuplicatePrimary(ParticipantId),

    #[error("{participant} holds {count} secondary entries (limit {limit})")]
    TooManySecondaries {
        participant: ParticipantId,
        count: usize,
        limit: usize,
    },

    #[error("tier {tier} out of range for {role}")]
    TierOutOfRange { role: Role, tier: u8 },

    #[error("pending promotion for {0} who is not waitlisted")]
    StaleIntent(ParticipantId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_converts_into_op_error() {
        let err: RosterOpError = ValidationError::EmptyField("title").into();
        assert!(err.to_string().contains("title must not be empty"));
    }

    #[test]
    fn secondary_limit_display() {
        let err = RosterOpError::SecondaryLimit {
            participant: "5".into(),
            limit: 3,
        };
        assert_eq!(err.to_string(), "5 already holds 3 secondary entries");
    }
}
