//! Panel rendering
//!
//! Produces the text document shown to participants. The layout is also the
//! input format of [`crate::recovery`], so markers here are load-bearing:
//!
//! ```text
//! **Lider:** <@leader>
//! **Co:** <title>
//!
//! **Kiedy:** <date> <time> [<duration>]
//! **[Zapisy zamknięte]**            (closed panels only)
//! ──────────────────────────────
//! **Wymogi:**
//! <requirements>
//! ──────────────────────────────
//! **Skład ( <n>/<capacity> ):**
//! 1. <@id> [Role] [SP n] (Alt)
//! 2. —
//!
//! **Rezerwa:**
//! —
//! ```

use crate::schedule::humanize_delta;
use chrono::{DateTime, Utc};
use roster_model::{Entry, Panel};
use serde::Serialize;
use std::fmt::Write;

pub const LEADER_MARKER: &str = "**Lider:**";
pub const TITLE_MARKER: &str = "**Co:**";
pub const WHEN_MARKER: &str = "**Kiedy:**";
pub const REQUIREMENTS_MARKER: &str = "**Wymogi:**";
pub const ROSTER_MARKER: &str = "**Skład";
pub const WAITLIST_MARKER: &str = "**Rezerwa:**";
pub const CLOSED_MARKER: &str = "**[Zapisy zamknięte]**";
pub const SEPARATOR: &str = "──────────────────────────────";
/// Shown in place of an empty slot, list or field
pub const EMPTY: &str = "—";

/// Text form of a panel, ready for the surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPanel {
    pub title: String,
    pub body: String,
    pub closed: bool,
    /// Whether participant signup controls should be offered
    pub signups_open: bool,
}

/// One roster line, numbered from 1
#[must_use]
pub fn entry_line(entry: &Entry, index: usize) -> String {
    let alt = if entry.is_secondary { " (Alt)" } else { "" };
    format!(
        "{index}. {} [{}] [SP {}]{alt}",
        entry.participant_id.mention(),
        entry.role,
        entry.tier
    )
}

fn or_empty(text: &str) -> &str {
    if text.trim().is_empty() {
        EMPTY
    } else {
        text
    }
}

/// Render the full panel document
#[must_use]
pub fn render_panel(panel: &Panel) -> RenderedPanel {
    let meta = &panel.meta;
    let mut body = String::new();

    // writing into a String cannot fail
    let _ = writeln!(body, "{LEADER_MARKER} {}", meta.leader_id.mention());
    let _ = writeln!(body, "{TITLE_MARKER} {}", meta.title);
    body.push('\n');
    let _ = writeln!(
        body,
        "{WHEN_MARKER} {} {} [{}]",
        meta.date_text, meta.time_text, meta.duration_text
    );
    if meta.closed {
        let _ = writeln!(body, "{CLOSED_MARKER}");
    }
    let _ = writeln!(body, "{SEPARATOR}");
    let _ = writeln!(body, "{REQUIREMENTS_MARKER}\n{}", or_empty(&meta.requirements));
    let _ = writeln!(body, "{SEPARATOR}");

    let _ = writeln!(
        body,
        "{ROSTER_MARKER} ( {}/{} ):**",
        panel.active.len(),
        panel.capacity
    );
    for slot in 0..usize::from(panel.capacity) {
        match panel.active.get(slot) {
            Some(entry) => {
                let _ = writeln!(body, "{}", entry_line(entry, slot + 1));
            }
            None => {
                let _ = writeln!(body, "{}. {EMPTY}", slot + 1);
            }
        }
    }
    body.push('\n');

    let _ = writeln!(body, "{WAITLIST_MARKER}");
    if panel.waitlist.is_empty() {
        body.push_str(EMPTY);
    } else {
        let lines: Vec<String> = panel
            .waitlist
            .iter()
            .enumerate()
            .map(|(i, e)| entry_line(e, i + 1))
            .collect();
        body.push_str(&lines.join("\n"));
    }

    RenderedPanel {
        title: meta.title.clone(),
        body,
        closed: meta.closed,
        signups_open: !meta.closed,
    }
}

fn mentions(list: &[Entry]) -> String {
    let ids = Panel::distinct_participants(list);
    if ids.is_empty() {
        EMPTY.to_string()
    } else {
        ids.iter().map(|id| id.mention()).collect::<Vec<_>>().join(" ")
    }
}

/// Mention digest of everyone signed up, with the time left until start
#[must_use]
pub fn broadcast_digest(panel: &Panel, now: DateTime<Utc>) -> String {
    let meta = &panel.meta;
    let schedule = format!("**{} {}**", meta.date_text, meta.time_text);
    let when = match meta.start_at {
        Some(start) if start >= now => format!("Start {} ({schedule})", humanize_delta(start - now)),
        Some(start) => format!("Start był {} ({schedule})", humanize_delta(start - now)),
        None => format!("Termin: {schedule} (brak pewnego timestampu)"),
    };

    format!(
        "**Oznaczenie zapisanych**\n{when}\n\n**Skład ({}/{})**: {}\n**Rezerwa ({})**: {}",
        panel.active.len(),
        panel.capacity,
        mentions(&panel.active),
        panel.waitlist.len(),
        mentions(&panel.waitlist),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use roster_model::{PanelMeta, ParticipantId, Role};

    fn sample() -> Panel {
        let meta = PanelMeta::new(ParticipantId::from("9"), "Dymacho")
            .with_requirements("SP 8+")
            .with_schedule("11.11.2025", "21:00", "1h");
        let mut panel = Panel::new(3, meta);
        panel.active.push(Entry::clamped("1".into(), Role::Mage, 5, false));
        panel.active.push(Entry::clamped("2".into(), Role::Martial, 7, true));
        panel
    }

    #[test]
    fn renders_slots_and_empty_waitlist() {
        let rendered = render_panel(&sample());
        let expected = "\
**Lider:** <@9>
**Co:** Dymacho

**Kiedy:** 11.11.2025 21:00 [1h]
──────────────────────────────
**Wymogi:**
SP 8+
──────────────────────────────
**Skład ( 2/3 ):**
1. <@1> [Mag] [SP 5]
2. <@2> [MSW] [SP 7] (Alt)
3. —

**Rezerwa:**
—";
        assert_eq!(rendered.body, expected);
        assert_eq!(rendered.title, "Dymacho");
        assert!(rendered.signups_open);
    }

    #[test]
    fn closed_panel_has_marker() {
        let mut panel = sample();
        panel.meta.closed = true;
        let rendered = render_panel(&panel);
        assert!(rendered.body.contains(CLOSED_MARKER));
        assert!(rendered.closed);
        assert!(!rendered.signups_open);
    }

    #[test]
    fn waitlist_is_numbered() {
        let mut panel = sample();
        panel.waitlist.push(Entry::clamped("3".into(), Role::Archer, 2, false));
        panel.waitlist.push(Entry::clamped("4".into(), Role::Warrior, 11, false));
        let body = render_panel(&panel).body;
        assert!(body.ends_with("**Rezerwa:**\n1. <@3> [Łucznik] [SP 2]\n2. <@4> [Wojownik] [SP 11]"));
    }

    #[test]
    fn digest_dedupes_and_humanizes() {
        let mut panel = sample();
        let now = DateTime::from_timestamp(1_762_891_200, 0).unwrap();
        panel.meta.start_at = Some(now + chrono::Duration::hours(26) + chrono::Duration::minutes(5));
        panel.active.push(Entry::clamped("1".into(), Role::Archer, 3, true));

        let digest = broadcast_digest(&panel, now);
        assert_eq!(
            digest,
            "**Oznaczenie zapisanych**\nStart za 1d 2h 5m (**11.11.2025 21:00**)\n\n\
             **Skład (3/3)**: <@1> <@2>\n**Rezerwa (0)**: —"
        );

        panel.meta.start_at = Some(now - chrono::Duration::minutes(3));
        assert!(broadcast_digest(&panel, now).contains("Start był 3m temu"));

        panel.meta.start_at = None;
        assert!(broadcast_digest(&panel, now).contains("brak pewnego timestampu"));
    }

    #[test]
    fn blank_requirements_render_as_dash() {
        let mut panel = sample();
        panel.meta.requirements.clear();
        assert!(render_panel(&panel).body.contains("**Wymogi:**\n—\n"));
    }
}
