//! Panel record: roster lists, event metadata and rendering location

use crate::entry::Entry;
use crate::ids::{ChannelId, GuildId, MessageId, PanelId, ParticipantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Smallest allowed active roster
pub const MIN_CAPACITY: u8 = 1;
/// Largest allowed active roster
pub const MAX_CAPACITY: u8 = 20;
/// Capacity assumed when a rendered snapshot carries no marker
pub const DEFAULT_CAPACITY: u8 = MAX_CAPACITY;
/// Secondary registrations allowed per participant
pub const DEFAULT_SECONDARY_LIMIT: usize = 3;

/// Clamp any requested capacity into `MIN_CAPACITY..=MAX_CAPACITY`
#[inline]
#[must_use]
pub fn clamp_capacity(requested: i64) -> u8 {
    let clamped = requested.clamp(i64::from(MIN_CAPACITY), i64::from(MAX_CAPACITY));
    u8::try_from(clamped).unwrap_or(MAX_CAPACITY)
}

/// A waitlisted participant scheduled to move up once `due_at` passes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPromotion {
    #[serde(alias = "userId")]
    pub participant_id: ParticipantId,
    #[serde(
        rename = "dueAtEpochMs",
        alias = "scheduledAt",
        with = "chrono::serde::ts_milliseconds"
    )]
    pub due_at: DateTime<Utc>,
}

impl PendingPromotion {
    /// Whether the delay has elapsed at `now`
    #[inline]
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

/// Event metadata carried alongside the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelMeta {
    pub leader_id: ParticipantId,
    #[serde(alias = "raidName")]
    pub title: String,
    #[serde(default)]
    pub requirements: String,
    #[serde(default)]
    pub date_text: String,
    #[serde(default)]
    pub time_text: String,
    #[serde(default, alias = "duration")]
    pub duration_text: String,
    #[serde(
        default,
        rename = "startAtEpochMs",
        alias = "startAt",
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub pending_promotions: Vec<PendingPromotion>,
}

impl PanelMeta {
    /// Minimal metadata: leader and title
    #[must_use]
    pub fn new(leader_id: ParticipantId, title: impl Into<String>) -> Self {
        Self {
            leader_id,
            title: title.into(),
            requirements: String::new(),
            date_text: String::new(),
            time_text: String::new(),
            duration_text: String::new(),
            start_at: None,
            closed: false,
            pending_promotions: Vec::new(),
        }
    }

    /// With requirements text
    #[inline]
    #[must_use]
    pub fn with_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.requirements = requirements.into();
        self
    }

    /// With free-text schedule descriptors
    #[inline]
    #[must_use]
    pub fn with_schedule(
        mut self,
        date_text: impl Into<String>,
        time_text: impl Into<String>,
        duration_text: impl Into<String>,
    ) -> Self {
        self.date_text = date_text.into();
        self.time_text = time_text.into();
        self.duration_text = duration_text.into();
        self
    }

    /// With derived start instant
    #[inline]
    #[must_use]
    pub fn with_start(mut self, start_at: Option<DateTime<Utc>>) -> Self {
        self.start_at = start_at;
        self
    }
}

/// Where the rendered panel lives on the chat platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelLocation {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

/// One scheduled event's full signup state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panel {
    pub panel_id: PanelId,
    pub capacity: u8,
    pub active: Vec<Entry>,
    pub waitlist: Vec<Entry>,
    pub meta: PanelMeta,
    pub location: Option<PanelLocation>,
}

impl Panel {
    /// Create an empty panel with a fresh id; capacity is clamped
    #[must_use]
    pub fn new(capacity: i64, meta: PanelMeta) -> Self {
        Self::with_id(PanelId::new(), capacity, meta)
    }

    /// Create an empty panel with a known id
    #[must_use]
    pub fn with_id(panel_id: PanelId, capacity: i64, meta: PanelMeta) -> Self {
        Self {
            panel_id,
            capacity: clamp_capacity(capacity),
            active: Vec::new(),
            waitlist: Vec::new(),
            meta,
            location: None,
        }
    }

    /// Number of free active slots
    #[inline]
    #[must_use]
    pub fn free_slots(&self) -> usize {
        usize::from(self.capacity).saturating_sub(self.active.len())
    }

    /// Active roster is at capacity
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free_slots() == 0
    }

    /// Free slots exist and someone is waiting for one
    #[inline]
    #[must_use]
    pub fn has_vacancy(&self) -> bool {
        self.free_slots() > 0 && !self.waitlist.is_empty()
    }

    /// Both lists, active first
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.active.iter().chain(self.waitlist.iter())
    }

    /// Whether the participant holds any entry
    #[must_use]
    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.entries().any(|e| e.is_for(participant))
    }

    /// Secondary entries held by the participant across both lists
    #[must_use]
    pub fn secondary_count(&self, participant: &ParticipantId) -> usize {
        self.entries()
            .filter(|e| e.is_for(participant) && e.is_secondary)
            .count()
    }

    /// Whether the participant has an entry on the waitlist
    #[must_use]
    pub fn is_waitlisted(&self, participant: &ParticipantId) -> bool {
        self.waitlist.iter().any(|e| e.is_for(participant))
    }

    /// Whether a promotion is pending for the participant
    #[must_use]
    pub fn has_pending(&self, participant: &ParticipantId) -> bool {
        self.meta
            .pending_promotions
            .iter()
            .any(|p| &p.participant_id == participant)
    }

    /// Participants in `list`, deduplicated, in list order
    #[must_use]
    pub fn distinct_participants(list: &[Entry]) -> Vec<ParticipantId> {
        let mut seen: Vec<ParticipantId> = Vec::new();
        for entry in list {
            if !seen.contains(&entry.participant_id) {
                seen.push(entry.participant_id.clone());
            }
        }
        seen
    }

    /// Record where the panel was rendered
    pub fn attach_location(&mut self, location: PanelLocation) {
        self.location = Some(location);
    }

    /// Message id of the rendered panel, if rendered
    #[inline]
    #[must_use]
    pub fn message_id(&self) -> Option<&MessageId> {
        self.location.as_ref().map(|l| &l.message_id)
    }
}
