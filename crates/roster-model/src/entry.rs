//! Registrations and roles

use crate::error::ValidationError;
use crate::ids::ParticipantId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Character class a participant signs up as
///
/// Serialized with the labels shown on the rendered panel so stored records
/// and rendered text agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "Łucznik", alias = "archer")]
    Archer,
    #[serde(rename = "Wojownik", alias = "warrior")]
    Warrior,
    #[serde(rename = "Mag", alias = "mage")]
    Mage,
    #[serde(rename = "MSW", alias = "martial")]
    Martial,
}

impl Role {
    /// All roles in display order
    pub const ALL: [Role; 4] = [Role::Archer, Role::Warrior, Role::Mage, Role::Martial];

    /// Label used on the rendered panel
    #[inline]
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Role::Archer => "Łucznik",
            Role::Warrior => "Wojownik",
            Role::Mage => "Mag",
            Role::Martial => "MSW",
        }
    }

    /// Highest tier this role can register with
    #[inline]
    #[must_use]
    pub fn max_tier(self) -> u8 {
        match self {
            Role::Martial => 7,
            _ => 11,
        }
    }

    /// Check a tier against this role's range
    pub fn validate_tier(self, tier: u8) -> Result<u8, ValidationError> {
        if (1..=self.max_tier()).contains(&tier) {
            Ok(tier)
        } else {
            Err(ValidationError::TierOutOfRange {
                role: self,
                tier,
                max: self.max_tier(),
            })
        }
    }

    /// Force a tier into this role's range
    #[inline]
    #[must_use]
    pub fn clamp_tier(self, tier: u8) -> u8 {
        tier.clamp(1, self.max_tier())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    /// Accepts panel labels (any case) and the English aliases
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Role::ALL
            .into_iter()
            .find(|role| {
                role.label().to_lowercase() == needle || format!("{role:?}").to_lowercase() == needle
            })
            .ok_or_else(|| ValidationError::UnknownRole(s.to_string()))
    }
}

/// One participant registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(alias = "userId")]
    pub participant_id: ParticipantId,
    #[serde(alias = "cls")]
    pub role: Role,
    #[serde(alias = "sp")]
    pub tier: u8,
    #[serde(default, alias = "isAlt")]
    pub is_secondary: bool,
}

impl Entry {
    /// Create a validated entry
    pub fn new(
        participant_id: ParticipantId,
        role: Role,
        tier: u8,
        is_secondary: bool,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            participant_id,
            role,
            tier: role.validate_tier(tier)?,
            is_secondary,
        })
    }

    /// Create the participant's primary entry
    #[inline]
    pub fn primary(participant_id: ParticipantId, role: Role, tier: u8) -> Result<Self, ValidationError> {
        Self::new(participant_id, role, tier, false)
    }

    /// Create a secondary ("alt") entry
    #[inline]
    pub fn secondary(participant_id: ParticipantId, role: Role, tier: u8) -> Result<Self, ValidationError> {
        Self::new(participant_id, role, tier, true)
    }

    /// Build an entry from untrusted data, clamping the tier instead of failing
    #[must_use]
    pub fn clamped(participant_id: ParticipantId, role: Role, tier: u8, is_secondary: bool) -> Self {
        Self {
            participant_id,
            role,
            tier: role.clamp_tier(tier),
            is_secondary,
        }
    }

    /// Whether this entry belongs to `participant`
    #[inline]
    #[must_use]
    pub fn is_for(&self, participant: &ParticipantId) -> bool {
        &self.participant_id == participant
    }
}
