//! Snapshot recovery
//!
//! Rebuilds a [`Panel`] from the text produced by [`crate::render`] when the
//! stored record is missing. Best effort: unknown lines are skipped, missing
//! fields fall back to defaults. Only the title is required.
//!
//! The result always satisfies the panel invariants, carries no pending
//! promotions and is open for signups.

use crate::error::RecoveryError;
use crate::render::EMPTY;
use crate::schedule::{parse_start, ScheduleZone};
use once_cell::sync::Lazy;
use regex::Regex;
use roster_model::{
    clamp_capacity, Entry, Panel, PanelId, PanelLocation, PanelMeta, ParticipantId, Role,
    DEFAULT_CAPACITY, DEFAULT_SECONDARY_LIMIT,
};

fn pattern(source: &str) -> Regex {
    Regex::new(source).unwrap_or_else(|err| panic!("invalid recovery pattern {source}: {err}"))
}

static LEADER: Lazy<Regex> = Lazy::new(|| pattern(r"\*\*Lider:\*\*\s*<@!?(\d+)>"));
static TITLE: Lazy<Regex> = Lazy::new(|| pattern(r"\*\*Co:\*\*[ \t]*([^\n]+)"));
static WHEN: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?m)\*\*Kiedy:\*\*[ \t]*([^\n\[]*?)[ \t]*(?:\[([^\]\n]*)\])?[ \t]*$"));
static REQUIREMENTS: Lazy<Regex> = Lazy::new(|| pattern(r"(?s)\*\*Wymogi:\*\*(.*?)─{30}"));
static CAPACITY: Lazy<Regex> =
    Lazy::new(|| pattern(r"\*\*Skład\s*\(\s*\d+\s*/\s*(\d+)\s*\)\s*:\*\*"));
static ACTIVE_BLOCK: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?s)\*\*Skład[^\n]*:\*\*(.*?)(?:\n[ \t]*\n|\*\*Rezerwa:\*\*|\z)"));
static WAITLIST_BLOCK: Lazy<Regex> = Lazy::new(|| pattern(r"(?s)\*\*Rezerwa:\*\*(.*)\z"));
static MENTION: Lazy<Regex> = Lazy::new(|| pattern(r"<@!?(\d+)>"));
static ROLE: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)\[(Łucznik|Wojownik|Mag|MSW)\]"));
static TIER: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)\[SP\s*(\d{1,2})\]"));
static ALT: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)\(Alt\)"));

/// Inputs that do not come from the text itself
#[derive(Debug, Clone)]
pub struct RecoveryContext {
    /// Leader used when the text names none (usually the acting participant)
    pub fallback_leader: ParticipantId,
    pub panel_id: PanelId,
    pub location: Option<PanelLocation>,
    pub zone: ScheduleZone,
    pub secondary_limit: usize,
}

impl RecoveryContext {
    /// Context with a fresh panel id
    #[must_use]
    pub fn new(fallback_leader: ParticipantId) -> Self {
        Self {
            fallback_leader,
            panel_id: PanelId::new(),
            location: None,
            zone: ScheduleZone::Local,
            secondary_limit: DEFAULT_SECONDARY_LIMIT,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_panel_id(mut self, panel_id: PanelId) -> Self {
        self.panel_id = panel_id;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_location(mut self, location: Option<PanelLocation>) -> Self {
        self.location = location;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_zone(mut self, zone: ScheduleZone) -> Self {
        self.zone = zone;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_secondary_limit(mut self, limit: usize) -> Self {
        self.secondary_limit = limit;
        self
    }
}

/// A reconstructed panel plus what had to be discarded to make it valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredPanel {
    pub panel: Panel,
    /// Entries dropped by normalisation (duplicates, excess secondaries)
    pub dropped: Vec<Entry>,
}

/// Reconstruct a panel from its rendered text
///
/// # Errors
/// - `RecoveryError::EmptySnapshot` for blank text
/// - `RecoveryError::MissingTitle` when there is no `**Co:**` line
pub fn reconstruct(text: &str, ctx: &RecoveryContext) -> Result<RecoveredPanel, RecoveryError> {
    if text.trim().is_empty() {
        return Err(RecoveryError::EmptySnapshot);
    }

    let title = TITLE
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(RecoveryError::MissingTitle)?;

    let leader = LEADER
        .captures(text)
        .map_or_else(|| ctx.fallback_leader.clone(), |c| ParticipantId::from(&c[1]));

    let (date_text, time_text, duration_text) = WHEN.captures(text).map_or_else(
        || (String::new(), String::new(), String::new()),
        |c| {
            let (date, time) = split_when(&c[1]);
            let duration = c.get(2).map_or("", |m| m.as_str().trim()).to_string();
            (date, time, duration)
        },
    );

    let requirements = REQUIREMENTS
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|r| r != EMPTY)
        .unwrap_or_default();

    let capacity = CAPACITY
        .captures(text)
        .and_then(|c| c[1].parse::<i64>().ok())
        .filter(|c| *c > 0)
        .map_or(DEFAULT_CAPACITY, clamp_capacity);

    let active = ACTIVE_BLOCK
        .captures(text)
        .map(|c| parse_block(&c[1]))
        .unwrap_or_default();
    let waitlist = WAITLIST_BLOCK
        .captures(text)
        .map(|c| parse_block(&c[1]))
        .unwrap_or_default();

    let start_at = parse_start(&date_text, &time_text).and_then(|naive| ctx.zone.to_utc(naive));
    let meta = PanelMeta::new(leader, title)
        .with_requirements(requirements)
        .with_schedule(date_text, time_text, duration_text)
        .with_start(start_at);

    let mut panel = Panel::with_id(ctx.panel_id, i64::from(capacity), meta);
    panel.active = active;
    panel.waitlist = waitlist;
    panel.location.clone_from(&ctx.location);
    let dropped = panel.normalize(ctx.secondary_limit);

    Ok(RecoveredPanel { panel, dropped })
}

/// Split `"<date words> <time>"`: the last token is the time
fn split_when(raw: &str) -> (String, String) {
    let raw = raw.trim();
    match raw.rsplit_once(char::is_whitespace) {
        Some((date, time)) => (date.trim().to_string(), time.to_string()),
        None => (String::new(), raw.to_string()),
    }
}

fn parse_block(block: &str) -> Vec<Entry> {
    block.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<Entry> {
    let line = line.trim();
    if line.is_empty() || line.ends_with(EMPTY) {
        return None;
    }
    let participant = ParticipantId::from(&MENTION.captures(line)?[1]);
    let role = ROLE
        .captures(line)
        .and_then(|c| c[1].parse::<Role>().ok())
        .unwrap_or(Role::Archer);
    let tier = TIER
        .captures(line)
        .and_then(|c| c[1].parse::<u8>().ok())
        .unwrap_or(1);
    Some(Entry::clamped(participant, role, tier, ALT.is_match(line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::render_panel;
    use chrono::FixedOffset;
    use pretty_assertions::assert_eq;

    fn ctx() -> RecoveryContext {
        RecoveryContext::new(ParticipantId::from("actor"))
            .with_zone(ScheduleZone::Fixed(FixedOffset::east_opt(0).unwrap()))
    }

    fn ids(list: &[Entry]) -> Vec<&str> {
        list.iter().map(|e| e.participant_id.as_str()).collect()
    }

    #[test]
    fn minimal_snapshot() {
        let text = "**Co:** X\n**Skład (2/5):**\n1. <@1> [Mag] [SP 4]\n2. <@2> [MSW] [SP 3] (Alt)\n";
        let recovered = reconstruct(text, &ctx()).unwrap();
        let panel = recovered.panel;

        assert_eq!(panel.meta.title, "X");
        assert_eq!(panel.capacity, 5);
        assert_eq!(ids(&panel.active), vec!["1", "2"]);
        assert!(panel.active[1].is_secondary);
        assert_eq!(panel.active[1].role, Role::Martial);
        assert_eq!(panel.meta.leader_id.as_str(), "actor");
        assert!(panel.waitlist.is_empty());
        assert!(panel.meta.pending_promotions.is_empty());
        assert!(!panel.meta.closed);
    }

    #[test]
    fn missing_title_is_not_recoverable() {
        let text = "**Lider:** <@9>\n**Skład (0/5):**\n";
        assert_eq!(reconstruct(text, &ctx()).unwrap_err(), RecoveryError::MissingTitle);
        assert_eq!(reconstruct("  ", &ctx()).unwrap_err(), RecoveryError::EmptySnapshot);
    }

    #[test]
    fn rendered_panel_reconstructs() {
        let meta = PanelMeta::new(ParticipantId::from("9"), "Dymacho")
            .with_requirements("SP 8+\nfulki")
            .with_schedule("11 listopada 2025", "21:00", "1h");
        let mut original = Panel::new(2, meta);
        original.active.push(Entry::clamped("1".into(), Role::Mage, 5, false));
        original.active.push(Entry::clamped("2".into(), Role::Warrior, 9, false));
        original.waitlist.push(Entry::clamped("3".into(), Role::Archer, 1, true));
        original.meta.closed = true;

        let text = render_panel(&original).body;
        let panel = reconstruct(&text, &ctx()).unwrap().panel;

        assert_eq!(panel.meta.leader_id.as_str(), "9");
        assert_eq!(panel.meta.date_text, "11 listopada 2025");
        assert_eq!(panel.meta.time_text, "21:00");
        assert_eq!(panel.meta.duration_text, "1h");
        assert_eq!(panel.meta.requirements, "SP 8+\nfulki");
        assert_eq!(panel.capacity, 2);
        assert_eq!(panel.active, original.active);
        assert_eq!(panel.waitlist, original.waitlist);
        assert_eq!(
            panel.meta.start_at.map(|s| s.to_rfc3339()),
            Some("2025-11-11T21:00:00+00:00".to_string())
        );
        // recovered panels reopen
        assert!(!panel.meta.closed);
    }

    #[test]
    fn lines_default_and_clamp() {
        let text = "**Co:** X\n**Skład ( 1 / 40 ):**\n1. <@!7> [SP 30]\n2. —\nnoise line\n\n**Rezerwa:**\n1. <@8> [msw] [SP 9]\n";
        let panel = reconstruct(text, &ctx()).unwrap().panel;

        assert_eq!(panel.capacity, 20);
        assert_eq!(panel.active.len(), 1);
        assert_eq!(panel.active[0].role, Role::Archer);
        assert_eq!(panel.active[0].tier, 11);
        assert_eq!(panel.waitlist[0].role, Role::Martial);
        assert_eq!(panel.waitlist[0].tier, 7);
    }

    #[test]
    fn normalises_duplicates_and_overflow() {
        let text = "**Co:** X\n**Skład (3/1):**\n1. <@1> [Mag] [SP 4]\n2. <@2> [Mag] [SP 4]\n3. <@1> [Mag] [SP 4]\n\n**Rezerwa:**\n—";
        let recovered = reconstruct(text, &ctx()).unwrap();
        assert_eq!(recovered.dropped.len(), 1);
        assert_eq!(ids(&recovered.panel.active), vec!["1"]);
        assert_eq!(ids(&recovered.panel.waitlist), vec!["2"]);
        assert!(recovered.panel.check_invariants(DEFAULT_SECONDARY_LIMIT).is_ok());
    }

    #[test]
    fn role_mentions_are_not_participants() {
        let text = "**Lider:** <@&55>\n**Co:** X\n**Skład (2/5):**\n1. <@&77> [Mag] [SP 4]\n2. <@!12> [Mag] [SP 4]\n";
        let panel = reconstruct(text, &ctx()).unwrap().panel;
        assert_eq!(ids(&panel.active), vec!["12"]);
        assert_eq!(panel.meta.leader_id.as_str(), "actor");
    }

    #[test]
    fn unparsable_schedule_leaves_start_empty() {
        let text = "**Co:** X\n**Kiedy:** jutro wieczorem []\n";
        let panel = reconstruct(text, &ctx()).unwrap().panel;
        assert_eq!(panel.meta.date_text, "jutro");
        assert_eq!(panel.meta.time_text, "wieczorem");
        assert_eq!(panel.meta.duration_text, "");
        assert!(panel.meta.start_at.is_none());
    }
}
