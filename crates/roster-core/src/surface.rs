//! Outbound port: where rendered panels and notifications go
//!
//! The engine calls a [`PanelSurface`] after every committed mutation, while
//! still holding the panel lock. Each call is bounded by the configured
//! delivery timeout; failures are logged as degraded delivery and never undo
//! the mutation.

use async_trait::async_trait;
use roster_model::{Panel, ParticipantId, Placement, WithdrawScope};
use roster_text::RenderedPanel;
use serde::Serialize;
use std::time::Duration;

/// Delivery failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Target channel or message is gone or inaccessible
    #[error("surface unavailable: {0}")]
    Unavailable(String),

    /// Platform refused the content
    #[error("delivery rejected: {0}")]
    Rejected(String),

    /// Call exceeded the delivery timeout
    #[error("delivery timed out after {0:?}")]
    TimedOut(Duration),
}

/// Human-facing event produced by a mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Notification {
    Joined {
        participant: ParticipantId,
        placement: Placement,
        secondary: bool,
    },
    Left {
        participant: ParticipantId,
        scope: WithdrawScope,
    },
    AdminAdded {
        participant: ParticipantId,
        placement: Placement,
    },
    AdminRemoved {
        participant: ParticipantId,
    },
    AutoPromoted {
        participant: ParticipantId,
    },
    AdminPromoted {
        participant: ParticipantId,
        bumped: Option<ParticipantId>,
    },
    AdminDemoted {
        participant: ParticipantId,
    },
    LeaderChanged {
        leader: ParticipantId,
    },
    DateChanged {
        date_text: String,
        time_text: String,
    },
    DetailsChanged,
    CapacityChanged {
        capacity: u8,
        clamped: bool,
    },
    PanelClosed,
    RosterBroadcast {
        text: String,
    },
}

fn place(placement: Placement) -> &'static str {
    match placement {
        Placement::Active => "do **głównego składu**",
        Placement::Waitlist => "do **rezerwy**",
    }
}

impl Notification {
    /// Message text as posted to the channel
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Joined {
                participant,
                placement,
                secondary,
            } => {
                let alt = if *secondary { " (Alt)" } else { "" };
                format!("{} zapisał(a) się{alt} {}.", participant.mention(), place(*placement))
            }
            Self::Left { participant, scope } => match scope {
                WithdrawScope::Primary => format!("{} **wypisał(a) się** z rajdu.", participant.mention()),
                WithdrawScope::All => format!("{} **wypisał(a) się (Wszystko)**.", participant.mention()),
                WithdrawScope::Secondary => format!("{} **usunął(ęła) alty**.", participant.mention()),
            },
            Self::AdminAdded {
                participant,
                placement,
            } => format!("{} dodany przez lidera {}.", participant.mention(), place(*placement)),
            Self::AdminRemoved { participant } => {
                format!("{} usunięty przez lidera.", participant.mention())
            }
            Self::AutoPromoted { participant } => format!(
                "{} **został(a) przeniesion(y/a) do głównego składu**.",
                participant.mention()
            ),
            Self::AdminPromoted {
                participant,
                bumped,
            } => {
                let mut text = format!(
                    "{} przeniesion(y/a) przez lidera **do składu**.",
                    participant.mention()
                );
                if let Some(bumped) = bumped {
                    text.push_str(&format!(" {} trafia do rezerwy.", bumped.mention()));
                }
                text
            }
            Self::AdminDemoted { participant } => format!(
                "{} przeniesion(y/a) przez lidera **do rezerwy**.",
                participant.mention()
            ),
            Self::LeaderChanged { leader } => format!("Nowy lider rajdu: {}.", leader.mention()),
            Self::DateChanged {
                date_text,
                time_text,
            } => format!("Lider zaktualizował termin rajdu na **{date_text} {time_text}**."),
            Self::DetailsChanged => "Lider zaktualizował opis rajdu.".to_string(),
            Self::CapacityChanged { capacity, clamped } => {
                let note = if *clamped { " (przycięto do dozwolonego zakresu)" } else { "" };
                format!("Liczba miejsc w składzie: **{capacity}**{note}.")
            }
            Self::PanelClosed => "Zapisy są zamknięte.".to_string(),
            Self::RosterBroadcast { text } => text.clone(),
        }
    }
}

/// Outbound port for rendered panels and notifications
#[async_trait]
pub trait PanelSurface: Send + Sync + std::fmt::Debug {
    /// Replace the visible panel with `rendered`
    async fn refresh(&self, panel: &Panel, rendered: &RenderedPanel) -> Result<(), DeliveryError>;

    /// Post a notification next to the panel
    async fn announce(&self, panel: &Panel, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Surface that writes everything to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSurface;

#[async_trait]
impl PanelSurface for LogSurface {
    async fn refresh(&self, panel: &Panel, rendered: &RenderedPanel) -> Result<(), DeliveryError> {
        tracing::info!(
            panel_id = %panel.panel_id,
            closed = rendered.closed,
            active = panel.active.len(),
            waitlist = panel.waitlist.len(),
            "Panel refreshed"
        );
        tracing::debug!(panel_id = %panel.panel_id, "\n{}", rendered.body);
        Ok(())
    }

    async fn announce(&self, panel: &Panel, notification: &Notification) -> Result<(), DeliveryError> {
        tracing::info!(panel_id = %panel.panel_id, "{}", notification.text());
        Ok(())
    }
}

/// Surface that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSurface;

#[async_trait]
impl PanelSurface for NullSurface {
    async fn refresh(&self, _panel: &Panel, _rendered: &RenderedPanel) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn announce(&self, _panel: &Panel, _notification: &Notification) -> Result<(), DeliveryError> {
        Ok(())
    }
}
