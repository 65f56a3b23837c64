//! Inbound action dispatch
//!
//! Transport adapters hand every user interaction to [`RosterService`] as an
//! [`ActionEnvelope`]:
//!
//! ```json
//! {
//!   "panelOrMessageId": "1203948571234",
//!   "actorId": "42",
//!   "action": { "actionKind": "join", "payload": { "role": "Mag", "tier": 5 } },
//!   "snapshot": { "text": "**Lider:** <@7>\n...", "channelId": "99", "messageId": "1203948571234" }
//! }
//! ```
//!
//! The reference is resolved as a panel id first, then as the id of the
//! message carrying the panel. When neither matches, the panel is rebuilt
//! from the snapshot text, adopted into the store and written out before the
//! action runs.

use crate::config::RosterConfig;
use crate::engine::{CreatedPanel, NewPanel, RosterEngine};
use crate::error::RosterError;
use chrono::{DateTime, Utc};
use roster_model::{
    ChannelId, GuildId, MessageId, PanelId, PanelLocation, ParticipantId, Placement, Role,
    WithdrawScope,
};
use roster_text::{reconstruct, RecoveryContext, ScheduleZone};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// One user interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEnvelope {
    pub panel_or_message_id: String,
    pub actor_id: ParticipantId,
    pub action: Action,
    /// Rendered panel visible at the point of interaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
}

/// Rendered text and location of a panel, used for recovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub text: String,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signup {
    pub role: Role,
    pub tier: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSignup {
    pub participant_id: ParticipantId,
    pub role: Role,
    pub tier: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub participant_id: ParticipantId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityChange {
    pub capacity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailsChange {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateChange {
    pub date_text: String,
    pub time_text: String,
    #[serde(default)]
    pub duration_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderChange {
    pub leader_id: ParticipantId,
}

/// Requested mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "actionKind", content = "payload", rename_all = "kebab-case")]
pub enum Action {
    Join(Signup),
    JoinSecondary(Signup),
    Withdraw,
    WithdrawSecondary,
    WithdrawAll,
    AdminAdd(TargetSignup),
    AdminRemove(Target),
    AdminPromote(Target),
    AdminDemote(Target),
    AdminSetCapacity(CapacityChange),
    AdminSetTitleOrRequirements(DetailsChange),
    AdminChangeDate(DateChange),
    AdminChangeLeader(LeaderChange),
    AdminBroadcastRoster,
}

impl Action {
    /// Wire name of the action
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::JoinSecondary(_) => "join-secondary",
            Self::Withdraw => "withdraw",
            Self::WithdrawSecondary => "withdraw-secondary",
            Self::WithdrawAll => "withdraw-all",
            Self::AdminAdd(_) => "admin-add",
            Self::AdminRemove(_) => "admin-remove",
            Self::AdminPromote(_) => "admin-promote",
            Self::AdminDemote(_) => "admin-demote",
            Self::AdminSetCapacity(_) => "admin-set-capacity",
            Self::AdminSetTitleOrRequirements(_) => "admin-set-title-or-requirements",
            Self::AdminChangeDate(_) => "admin-change-date",
            Self::AdminChangeLeader(_) => "admin-change-leader",
            Self::AdminBroadcastRoster => "admin-broadcast-roster",
        }
    }
}

/// What an action did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ActionOutcome {
    Joined {
        placement: Placement,
        /// A previous primary entry was replaced
        replaced: bool,
    },
    Withdrew {
        removed: usize,
    },
    Promoted {
        bumped: Option<ParticipantId>,
    },
    Demoted,
    Resized {
        capacity: u8,
        overflow: usize,
    },
    Updated,
    Rescheduled {
        #[serde(rename = "startAt")]
        start_at: DateTime<Utc>,
    },
    Broadcast {
        text: String,
    },
}

/// Reply to an [`ActionEnvelope`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReply {
    pub panel_id: PanelId,
    /// The panel was rebuilt from the snapshot for this action
    pub recovered: bool,
    #[serde(flatten)]
    pub outcome: ActionOutcome,
}

/// Front door for inbound actions
#[derive(Debug, Clone)]
pub struct RosterService {
    engine: RosterEngine,
    zone: ScheduleZone,
    secondary_limit: usize,
    recovery: Arc<Mutex<()>>,
}

impl RosterService {
    #[must_use]
    pub fn new(engine: RosterEngine, config: &RosterConfig) -> Self {
        Self {
            engine,
            zone: config.zone(),
            secondary_limit: config.secondary_limit,
            recovery: Arc::new(Mutex::new(())),
        }
    }

    #[inline]
    #[must_use]
    pub fn engine(&self) -> &RosterEngine {
        &self.engine
    }

    /// Create a panel
    ///
    /// # Errors
    /// See [`RosterEngine::create_panel`]
    pub async fn create_panel(&self, request: NewPanel) -> Result<CreatedPanel, RosterError> {
        self.engine.create_panel(request).await
    }

    /// Resolve the envelope's panel and apply its action
    ///
    /// # Errors
    /// - `NotRecoverable` if the panel is unknown and the snapshot is missing
    ///   or unreadable
    /// - Any error of the underlying engine operation
    pub async fn dispatch(&self, envelope: ActionEnvelope) -> Result<ActionReply, RosterError> {
        let ActionEnvelope {
            panel_or_message_id,
            actor_id,
            action,
            snapshot,
        } = envelope;
        let kind = action.kind();
        let (panel_id, recovered) = self
            .resolve(&panel_or_message_id, &actor_id, snapshot.as_ref())
            .await?;

        let result = self.apply(panel_id, &actor_id, action).await;
        match &result {
            Ok(_) => tracing::debug!(panel_id = %panel_id, actor = %actor_id, action = kind, "Action applied"),
            Err(e) => tracing::debug!(panel_id = %panel_id, actor = %actor_id, action = kind, error = %e, "Action rejected"),
        }
        result.map(|outcome| ActionReply {
            panel_id,
            recovered,
            outcome,
        })
    }

    /// Find the panel for `reference`, rebuilding it from `snapshot` if needed
    ///
    /// Returns the panel id and whether it was recovered.
    pub async fn resolve(
        &self,
        reference: &str,
        actor: &ParticipantId,
        snapshot: Option<&Snapshot>,
    ) -> Result<(PanelId, bool), RosterError> {
        if let Some(panel_id) = self.engine.store().resolve(reference) {
            return Ok((panel_id, false));
        }

        // one recovery at a time, so two actions on the same lost panel
        // adopt it once
        let _recovering = self.recovery.lock().await;
        if let Some(panel_id) = self.engine.store().resolve(reference) {
            return Ok((panel_id, false));
        }

        let snapshot = snapshot.ok_or_else(|| RosterError::not_recoverable(reference, "no snapshot"))?;
        let ctx = self.recovery_context(reference, actor, snapshot)?;
        let recovered = reconstruct(&snapshot.text, &ctx)
            .map_err(|e| RosterError::not_recoverable(reference, e))?;
        if !recovered.dropped.is_empty() {
            tracing::warn!(
                reference,
                dropped = recovered.dropped.len(),
                "Recovered panel needed repair"
            );
        }

        let panel_id = self.engine.adopt(recovered.panel).await;
        Ok((panel_id, true))
    }

    fn recovery_context(
        &self,
        reference: &str,
        actor: &ParticipantId,
        snapshot: &Snapshot,
    ) -> Result<RecoveryContext, RosterError> {
        let by_panel_id = reference.parse::<PanelId>().ok();
        let message_id = snapshot
            .message_id
            .clone()
            .or_else(|| by_panel_id.is_none().then(|| MessageId::from(reference)));

        let location = match (snapshot.channel_id.clone(), message_id) {
            (Some(channel_id), Some(message_id)) => Some(PanelLocation {
                channel_id,
                message_id,
                guild_id: snapshot.guild_id.clone(),
            }),
            // a message reference must stay resolvable after adoption
            (None, _) if by_panel_id.is_none() => {
                return Err(RosterError::not_recoverable(reference, "snapshot has no channel id"));
            }
            _ => None,
        };

        Ok(RecoveryContext::new(actor.clone())
            .with_panel_id(by_panel_id.unwrap_or_default())
            .with_location(location)
            .with_zone(self.zone)
            .with_secondary_limit(self.secondary_limit))
    }

    async fn apply(&self, panel_id: PanelId, actor: &ParticipantId, action: Action) -> Result<ActionOutcome, RosterError> {
        let engine = &self.engine;
        let outcome = match action {
            Action::Join(Signup { role, tier }) => {
                let joined = engine.join(panel_id, actor.clone(), role, tier, false).await?;
                ActionOutcome::Joined {
                    placement: joined.placement,
                    replaced: joined.replaced.is_some(),
                }
            }
            Action::JoinSecondary(Signup { role, tier }) => {
                let joined = engine.join(panel_id, actor.clone(), role, tier, true).await?;
                ActionOutcome::Joined {
                    placement: joined.placement,
                    replaced: false,
                }
            }
            Action::Withdraw => self.withdraw(panel_id, actor, WithdrawScope::Primary).await?,
            Action::WithdrawSecondary => self.withdraw(panel_id, actor, WithdrawScope::Secondary).await?,
            Action::WithdrawAll => self.withdraw(panel_id, actor, WithdrawScope::All).await?,
            Action::AdminAdd(TargetSignup {
                participant_id,
                role,
                tier,
            }) => {
                let joined = engine.admin_add(panel_id, actor, participant_id, role, tier).await?;
                ActionOutcome::Joined {
                    placement: joined.placement,
                    replaced: joined.replaced.is_some(),
                }
            }
            Action::AdminRemove(Target { participant_id }) => {
                let removed = engine.admin_remove(panel_id, actor, participant_id).await?;
                ActionOutcome::Withdrew {
                    removed: removed.removed.len(),
                }
            }
            Action::AdminPromote(Target { participant_id }) => {
                let promoted = engine.admin_promote(panel_id, actor, participant_id).await?;
                ActionOutcome::Promoted {
                    bumped: promoted.bumped.map(|e| e.participant_id),
                }
            }
            Action::AdminDemote(Target { participant_id }) => {
                engine.admin_demote(panel_id, actor, participant_id).await?;
                ActionOutcome::Demoted
            }
            Action::AdminSetCapacity(CapacityChange { capacity }) => {
                let resized = engine.set_capacity(panel_id, actor, capacity).await?;
                ActionOutcome::Resized {
                    capacity: resized.capacity,
                    overflow: resized.overflow.len(),
                }
            }
            Action::AdminSetTitleOrRequirements(DetailsChange { title, requirements }) => {
                engine.set_details(panel_id, actor, title, requirements).await?;
                ActionOutcome::Updated
            }
            Action::AdminChangeDate(DateChange {
                date_text,
                time_text,
                duration_text,
            }) => {
                let start_at = engine
                    .change_date(panel_id, actor, date_text, time_text, duration_text)
                    .await?;
                ActionOutcome::Rescheduled { start_at }
            }
            Action::AdminChangeLeader(LeaderChange { leader_id }) => {
                engine.change_leader(panel_id, actor, leader_id).await?;
                ActionOutcome::Updated
            }
            Action::AdminBroadcastRoster => ActionOutcome::Broadcast {
                text: engine.broadcast(panel_id, actor).await?,
            },
        };
        Ok(outcome)
    }

    async fn withdraw(
        &self,
        panel_id: PanelId,
        actor: &ParticipantId,
        scope: WithdrawScope,
    ) -> Result<ActionOutcome, RosterError> {
        let outcome = self.engine.withdraw(panel_id, actor.clone(), scope).await?;
        Ok(ActionOutcome::Withdrew {
            removed: outcome.removed.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn envelope_parses_from_wire_json() {
        let json = r#"{
            "panelOrMessageId": "1203948571234",
            "actorId": "42",
            "action": { "actionKind": "join-secondary", "payload": { "role": "Mag", "tier": 5 } },
            "snapshot": { "text": "**Co:** X", "channelId": "99" }
        }"#;
        let envelope: ActionEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(
            envelope.action,
            Action::JoinSecondary(Signup {
                role: Role::Mage,
                tier: 5
            })
        );
        let snapshot = envelope.snapshot.unwrap();
        assert_eq!(snapshot.channel_id, Some(ChannelId::from("99")));
        assert_eq!(snapshot.message_id, None);
    }

    #[test]
    fn unit_actions_need_no_payload() {
        let action: Action = serde_json::from_str(r#"{ "actionKind": "withdraw-all" }"#).unwrap();
        assert_eq!(action, Action::WithdrawAll);
        assert_eq!(action.kind(), "withdraw-all");

        let action: Action = serde_json::from_str(
            r#"{ "actionKind": "admin-set-title-or-requirements", "payload": { "requirements": "SP 9" } }"#,
        )
        .unwrap();
        assert_eq!(
            action,
            Action::AdminSetTitleOrRequirements(DetailsChange {
                title: None,
                requirements: Some("SP 9".into())
            })
        );
    }

    #[test]
    fn reply_flattens_outcome() {
        let reply = ActionReply {
            panel_id: PanelId::new(),
            recovered: true,
            outcome: ActionOutcome::Resized {
                capacity: 5,
                overflow: 2,
            },
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["outcome"], "resized");
        assert_eq!(json["capacity"], 5);
        assert_eq!(json["recovered"], true);
    }
}
