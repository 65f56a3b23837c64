//! Roster engine
//!
//! Wraps the pure transitions in `roster_model::roster` with everything a
//! live panel needs:
//! - Per-panel FIFO locking ([`PanelLocks`])
//! - Working-copy mutation, committed to the [`RosterStore`] only on success
//! - Debounced persistence ([`Persister`])
//! - Render refresh and notifications through a [`PanelSurface`], bounded by
//!   the delivery timeout
//!
//! Participant actions fail with [`RosterError::PanelClosed`] once signups are
//! closed. Admin actions require the acting participant to be the leader.

use crate::clock::{Clock, SystemClock};
use crate::config::RosterConfig;
use crate::error::RosterError;
use crate::lock::PanelLocks;
use crate::persistence::Persister;
use crate::store::RosterStore;
use crate::surface::{DeliveryError, Notification, NullSurface, PanelSurface};
use chrono::{DateTime, Utc};
use roster_model::{
    clamp_capacity, AdminPromoteOutcome, DemoteOutcome, Entry, JoinOutcome, Panel, PanelId,
    PanelLocation, PanelMeta, ParticipantId, ResizeOutcome, Role, VacancyOutcome, VacancyRules,
    ValidationError, WithdrawOutcome, WithdrawScope,
};
use roster_text::{broadcast_digest, render_panel, resolve_start, RenderedPanel, ScheduleZone};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Engine settings derived from [`RosterConfig`]
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub rules: VacancyRules,
    pub close_grace: chrono::Duration,
    pub delivery_timeout: Duration,
    pub zone: ScheduleZone,
}

impl From<&RosterConfig> for EngineSettings {
    fn from(config: &RosterConfig) -> Self {
        Self {
            rules: config.vacancy_rules(),
            close_grace: config.close_grace(),
            delivery_timeout: config.delivery_timeout(),
            zone: config.zone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&RosterConfig::default())
    }
}

/// Panel creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPanel {
    pub leader_id: ParticipantId,
    pub title: String,
    #[serde(default)]
    pub requirements: String,
    pub capacity: i64,
    pub date_text: String,
    pub time_text: String,
    #[serde(default)]
    pub duration_text: String,
}

/// Result of [`RosterEngine::create_panel`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPanel {
    pub panel_id: PanelId,
    pub capacity: u8,
    /// Requested capacity was outside the allowed range
    pub clamped: bool,
    pub start_at: DateTime<Utc>,
}

/// What one scheduler pass did to a panel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub promoted: Vec<ParticipantId>,
    pub closed: bool,
}

impl TickOutcome {
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty() && !self.closed
    }
}

type Notes = Vec<Notification>;

/// Lock-serialised roster operations over a shared store
#[derive(Debug, Clone)]
pub struct RosterEngine {
    store: Arc<RosterStore>,
    locks: PanelLocks,
    persister: Persister,
    surface: Arc<dyn PanelSurface>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl RosterEngine {
    /// Engine with no persistence, a silent surface and the system clock
    #[must_use]
    pub fn new(store: Arc<RosterStore>, config: &RosterConfig) -> Self {
        Self {
            store,
            locks: PanelLocks::new(),
            persister: Persister::disabled(),
            surface: Arc::new(NullSurface),
            clock: Arc::new(SystemClock),
            settings: EngineSettings::from(config),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_persister(mut self, persister: Persister) -> Self {
        self.persister = persister;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_surface(mut self, surface: Arc<dyn PanelSurface>) -> Self {
        self.surface = surface;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<RosterStore> {
        &self.store
    }

    #[inline]
    #[must_use]
    pub fn persister(&self) -> &Persister {
        &self.persister
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Current rendering of a stored panel
    #[must_use]
    pub fn render(&self, panel_id: &PanelId) -> Option<RenderedPanel> {
        self.store.get(panel_id).map(|panel| render_panel(&panel))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create and store a new panel
    ///
    /// # Errors
    /// - `Validation(EmptyField)` for a blank title
    /// - `Validation(UnparsableSchedule)` if the date/time text has no instant
    pub async fn create_panel(&self, request: NewPanel) -> Result<CreatedPanel, RosterError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyField("title").into());
        }
        let start_at = resolve_start(&request.date_text, &request.time_text, self.settings.zone)
            .map_err(ValidationError::from)?;

        let capacity = clamp_capacity(request.capacity);
        let meta = PanelMeta::new(request.leader_id, title)
            .with_requirements(request.requirements.trim())
            .with_schedule(request.date_text, request.time_text, request.duration_text)
            .with_start(Some(start_at));
        let panel = Panel::new(i64::from(capacity), meta);
        let panel_id = panel.panel_id;

        let _guard = self.locks.acquire(panel_id).await;
        self.store.insert(panel.clone());
        self.persister.mark_dirty();
        tracing::info!(panel_id = %panel_id, capacity, leader = %panel.meta.leader_id, "Panel created");
        self.publish(&panel, &[], true).await;

        Ok(CreatedPanel {
            panel_id,
            capacity,
            clamped: i64::from(capacity) != request.capacity,
            start_at,
        })
    }

    /// Remember where the panel is rendered
    ///
    /// # Errors
    /// - `PanelNotFound` if the panel is not stored
    pub async fn attach_location(&self, panel_id: PanelId, location: PanelLocation) -> Result<(), RosterError> {
        let _guard = self.locks.acquire(panel_id).await;
        let mut panel = self.load(panel_id)?;
        if panel.location.as_ref() == Some(&location) {
            return Ok(());
        }
        panel.attach_location(location);
        self.store.insert(panel);
        self.persister.mark_dirty();
        Ok(())
    }

    /// Insert a panel rebuilt from a snapshot, unless one with the same id
    /// already exists, and write it out immediately
    ///
    /// Free slots with waiting participants are filled or scheduled right
    /// away, since the rebuilt panel carries no promotion intents.
    pub async fn adopt(&self, mut panel: Panel) -> PanelId {
        let panel_id = panel.panel_id;
        let _guard = self.locks.acquire(panel_id).await;
        if self.store.contains(&panel_id) {
            return panel_id;
        }

        let vacancy = panel.evaluate_vacancies(&self.settings.rules, self.clock.now(), None);
        let mut notes = Notes::new();
        vacancy_notes(panel_id, &vacancy, &mut notes);

        self.store.insert(panel.clone());
        if let Err(e) = self.persister.flush().await {
            tracing::error!(panel_id = %panel_id, error = %e, "Saving recovered panel failed");
            self.persister.mark_dirty();
        }
        tracing::info!(
            panel_id = %panel_id,
            active = panel.active.len(),
            waitlist = panel.waitlist.len(),
            "Panel recovered from snapshot"
        );
        self.publish(&panel, &notes, true).await;
        panel_id
    }

    // ------------------------------------------------------------------
    // Participant actions
    // ------------------------------------------------------------------

    /// Register a primary or secondary entry
    ///
    /// # Errors
    /// - `PanelClosed`, `Validation` (tier), `CapacityLimit` (secondary cap)
    pub async fn join(
        &self,
        panel_id: PanelId,
        participant: ParticipantId,
        role: Role,
        tier: u8,
        secondary: bool,
    ) -> Result<JoinOutcome, RosterError> {
        let rules = self.settings.rules;
        self.mutate(panel_id, |panel, now, notes| {
            ensure_open(panel)?;
            let entry = Entry::new(participant.clone(), role, tier, secondary)?;
            let outcome = panel.join(entry, &rules, now)?;
            tracing::debug!(
                panel_id = %panel_id,
                participant = %participant,
                placement = ?outcome.placement,
                secondary,
                "Joined"
            );
            notes.push(Notification::Joined {
                participant,
                placement: outcome.placement,
                secondary,
            });
            vacancy_notes(panel_id, &outcome.vacancy, notes);
            Ok(outcome)
        })
        .await
    }

    /// Remove the participant's entries in `scope`
    ///
    /// Withdrawing something that is not registered changes nothing and
    /// announces nothing.
    ///
    /// # Errors
    /// - `PanelClosed`
    pub async fn withdraw(
        &self,
        panel_id: PanelId,
        participant: ParticipantId,
        scope: WithdrawScope,
    ) -> Result<WithdrawOutcome, RosterError> {
        let rules = self.settings.rules;
        self.mutate(panel_id, |panel, now, notes| {
            ensure_open(panel)?;
            let outcome = panel.withdraw(&participant, scope, &rules, now);
            if !outcome.is_noop() {
                tracing::debug!(
                    panel_id = %panel_id,
                    participant = %participant,
                    removed = outcome.removed.len(),
                    "Withdrew"
                );
                notes.push(Notification::Left { participant, scope });
                vacancy_notes(panel_id, &outcome.vacancy, notes);
            }
            Ok(outcome)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Leader actions
    // ------------------------------------------------------------------

    /// Register `target` with a primary entry on the leader's behalf
    ///
    /// Allowed on closed panels.
    pub async fn admin_add(
        &self,
        panel_id: PanelId,
        actor: &ParticipantId,
        target: ParticipantId,
        role: Role,
        tier: u8,
    ) -> Result<JoinOutcome, RosterError> {
        let rules = self.settings.rules;
        self.mutate(panel_id, |panel, now, notes| {
            ensure_leader(panel, actor)?;
            let entry = Entry::primary(target.clone(), role, tier)?;
            let outcome = panel.join(entry, &rules, now)?;
            notes.push(Notification::AdminAdded {
                participant: target,
                placement: outcome.placement,
            });
            vacancy_notes(panel_id, &outcome.vacancy, notes);
            Ok(outcome)
        })
        .await
    }

    /// Remove every entry of `target`
    pub async fn admin_remove(
        &self,
        panel_id: PanelId,
        actor: &ParticipantId,
        target: ParticipantId,
    ) -> Result<WithdrawOutcome, RosterError> {
        let rules = self.settings.rules;
        self.mutate(panel_id, |panel, now, notes| {
            ensure_leader(panel, actor)?;
            let outcome = panel.withdraw(&target, WithdrawScope::All, &rules, now);
            if !outcome.is_noop() {
                notes.push(Notification::AdminRemoved { participant: target });
                vacancy_notes(panel_id, &outcome.vacancy, notes);
            }
            Ok(outcome)
        })
        .await
    }

    /// Move `target` from the waitlist to the active roster now
    ///
    /// # Errors
    /// - `NotInWaitlist` if `target` is not waitlisted
    pub async fn admin_promote(
        &self,
        panel_id: PanelId,
        actor: &ParticipantId,
        target: ParticipantId,
    ) -> Result<AdminPromoteOutcome, RosterError> {
        let rules = self.settings.rules;
        self.mutate(panel_id, |panel, now, notes| {
            ensure_leader(panel, actor)?;
            let outcome = panel.admin_promote(&target, &rules, now)?;
            notes.push(Notification::AdminPromoted {
                participant: target,
                bumped: outcome.bumped.as_ref().map(|e| e.participant_id.clone()),
            });
            vacancy_notes(panel_id, &outcome.vacancy, notes);
            Ok(outcome)
        })
        .await
    }

    /// Move `target` from the active roster to the waitlist head
    ///
    /// # Errors
    /// - `NotInActive` if `target` holds no active entry
    pub async fn admin_demote(
        &self,
        panel_id: PanelId,
        actor: &ParticipantId,
        target: ParticipantId,
    ) -> Result<DemoteOutcome, RosterError> {
        let rules = self.settings.rules;
        self.mutate(panel_id, |panel, now, notes| {
            ensure_leader(panel, actor)?;
            let outcome = panel.admin_demote(&target, &rules, now)?;
            notes.push(Notification::AdminDemoted { participant: target });
            vacancy_notes(panel_id, &outcome.vacancy, notes);
            Ok(outcome)
        })
        .await
    }

    /// Change capacity, clamped to the allowed range
    pub async fn set_capacity(
        &self,
        panel_id: PanelId,
        actor: &ParticipantId,
        requested: i64,
    ) -> Result<ResizeOutcome, RosterError> {
        let rules = self.settings.rules;
        self.mutate(panel_id, |panel, now, notes| {
            ensure_leader(panel, actor)?;
            let outcome = panel.resize(requested, &rules, now);
            tracing::debug!(
                panel_id = %panel_id,
                previous = outcome.previous,
                capacity = outcome.capacity,
                overflow = outcome.overflow.len(),
                "Resized"
            );
            notes.push(Notification::CapacityChanged {
                capacity: outcome.capacity,
                clamped: i64::from(outcome.capacity) != requested,
            });
            vacancy_notes(panel_id, &outcome.vacancy, notes);
            Ok(outcome)
        })
        .await
    }

    /// Replace title and/or requirements
    ///
    /// # Errors
    /// - `Validation(EmptyField)` for a blank title
    pub async fn set_details(
        &self,
        panel_id: PanelId,
        actor: &ParticipantId,
        title: Option<String>,
        requirements: Option<String>,
    ) -> Result<(), RosterError> {
        self.mutate(panel_id, |panel, _now, notes| {
            ensure_leader(panel, actor)?;
            if let Some(title) = title {
                let title = title.trim();
                if title.is_empty() {
                    return Err(ValidationError::EmptyField("title").into());
                }
                panel.meta.title = title.to_string();
            }
            if let Some(requirements) = requirements {
                panel.meta.requirements = requirements.trim().to_string();
            }
            notes.push(Notification::DetailsChanged);
            Ok(())
        })
        .await
    }

    /// Reschedule the panel; also reopens closed signups
    ///
    /// # Errors
    /// - `Validation(UnparsableSchedule)` if the new text has no instant
    pub async fn change_date(
        &self,
        panel_id: PanelId,
        actor: &ParticipantId,
        date_text: String,
        time_text: String,
        duration_text: Option<String>,
    ) -> Result<DateTime<Utc>, RosterError> {
        let zone = self.settings.zone;
        self.mutate(panel_id, |panel, _now, notes| {
            ensure_leader(panel, actor)?;
            let start = resolve_start(&date_text, &time_text, zone).map_err(ValidationError::from)?;
            let meta = &mut panel.meta;
            meta.start_at = Some(start);
            meta.closed = false;
            if let Some(duration) = duration_text {
                meta.duration_text = duration;
            }
            meta.date_text.clone_from(&date_text);
            meta.time_text.clone_from(&time_text);
            tracing::info!(panel_id = %panel_id, start = %start, "Panel rescheduled");
            notes.push(Notification::DateChanged { date_text, time_text });
            Ok(start)
        })
        .await
    }

    /// Hand leadership to `leader`
    pub async fn change_leader(
        &self,
        panel_id: PanelId,
        actor: &ParticipantId,
        leader: ParticipantId,
    ) -> Result<(), RosterError> {
        self.mutate(panel_id, |panel, _now, notes| {
            ensure_leader(panel, actor)?;
            panel.meta.leader_id = leader.clone();
            notes.push(Notification::LeaderChanged { leader });
            Ok(())
        })
        .await
    }

    /// Post a mention digest of everyone signed up and return its text
    ///
    /// A missing start instant is recomputed from the schedule text first.
    pub async fn broadcast(&self, panel_id: PanelId, actor: &ParticipantId) -> Result<String, RosterError> {
        let zone = self.settings.zone;
        self.mutate(panel_id, |panel, now, notes| {
            ensure_leader(panel, actor)?;
            if panel.meta.start_at.is_none() {
                panel.meta.start_at = resolve_start(&panel.meta.date_text, &panel.meta.time_text, zone).ok();
            }
            let text = broadcast_digest(panel, now);
            notes.push(Notification::RosterBroadcast { text: text.clone() });
            Ok(text)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Scheduler
    // ------------------------------------------------------------------

    /// Apply promotions due at `now` and close signups once the grace
    /// period is over
    pub async fn tick_panel(&self, panel_id: PanelId, now: DateTime<Utc>) -> Result<TickOutcome, RosterError> {
        let grace = self.settings.close_grace;
        self.mutate_at(panel_id, Some(now), |panel, now, notes| {
            let vacancy = panel.apply_due_promotions(now);
            vacancy_notes(panel_id, &vacancy, notes);
            let closed = panel.close_if_due(now, grace);
            if closed {
                tracing::info!(panel_id = %panel_id, "Signups closed");
                notes.push(Notification::PanelClosed);
            }
            Ok(TickOutcome {
                promoted: vacancy.promoted.into_iter().map(|e| e.participant_id).collect(),
                closed,
            })
        })
        .await
    }

    /// Fill or schedule free slots that no promotion covers
    ///
    /// Used after panels are loaded from storage: stored intents may have
    /// been pruned, and nothing else re-examines a roster until its next
    /// mutation.
    pub async fn settle_vacancies(&self, panel_id: PanelId) -> Result<VacancyOutcome, RosterError> {
        let rules = self.settings.rules;
        self.mutate(panel_id, |panel, now, notes| {
            let vacancy = panel.evaluate_vacancies(&rules, now, None);
            vacancy_notes(panel_id, &vacancy, notes);
            Ok(vacancy)
        })
        .await
    }

    /// [`Self::settle_vacancies`] for every stored panel; returns how many
    /// panels changed
    pub async fn settle_all(&self) -> usize {
        let mut settled = 0;
        for panel_id in self.store.ids() {
            match self.settle_vacancies(panel_id).await {
                Ok(vacancy) => settled += usize::from(!vacancy.is_empty()),
                Err(e) if e.is_not_found() => {}
                Err(e) => tracing::error!(panel_id = %panel_id, error = %e, "Settling vacancies failed"),
            }
        }
        if settled > 0 {
            tracing::info!(panels = settled, "Settled vacancies after load");
        }
        settled
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn load(&self, panel_id: PanelId) -> Result<Panel, RosterError> {
        self.store
            .get(&panel_id)
            .ok_or_else(|| RosterError::PanelNotFound(panel_id.to_string()))
    }

    async fn mutate<T, F>(&self, panel_id: PanelId, op: F) -> Result<T, RosterError>
    where
        F: FnOnce(&mut Panel, DateTime<Utc>, &mut Notes) -> Result<T, RosterError>,
    {
        self.mutate_at(panel_id, None, op).await
    }

    /// Run `op` on a working copy under the panel lock
    ///
    /// The copy replaces the stored panel only when `op` succeeds and changed
    /// something. Side effects are delivered before the lock is released.
    /// Without an explicit instant the clock is read once the lock is held.
    async fn mutate_at<T, F>(&self, panel_id: PanelId, at: Option<DateTime<Utc>>, op: F) -> Result<T, RosterError>
    where
        F: FnOnce(&mut Panel, DateTime<Utc>, &mut Notes) -> Result<T, RosterError>,
    {
        let _guard = self.locks.acquire(panel_id).await;
        let original = self.load(panel_id)?;
        let mut working = original.clone();
        let mut notes = Notes::new();
        let now = at.unwrap_or_else(|| self.clock.now());

        let value = op(&mut working, now, &mut notes)?;

        let changed = working != original;
        if changed {
            self.store.insert(working.clone());
            self.persister.mark_dirty();
        }
        if changed || !notes.is_empty() {
            self.publish(&working, &notes, changed).await;
        }
        Ok(value)
    }

    async fn publish(&self, panel: &Panel, notes: &[Notification], refresh: bool) {
        if refresh {
            let rendered = render_panel(panel);
            self.deliver(panel.panel_id, "refresh", self.surface.refresh(panel, &rendered))
                .await;
        }
        for note in notes {
            self.deliver(panel.panel_id, "announce", self.surface.announce(panel, note))
                .await;
        }
    }

    async fn deliver<F>(&self, panel_id: PanelId, call: &'static str, delivery: F)
    where
        F: Future<Output = Result<(), DeliveryError>>,
    {
        let timeout = self.settings.delivery_timeout;
        let result = match tokio::time::timeout(timeout, delivery).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::TimedOut(timeout)),
        };
        if let Err(e) = result {
            tracing::warn!(panel_id = %panel_id, call, error = %e, "DeliveryDegraded");
        }
    }
}

fn ensure_open(panel: &Panel) -> Result<(), RosterError> {
    if panel.meta.closed {
        return Err(RosterError::PanelClosed(panel.panel_id));
    }
    Ok(())
}

fn ensure_leader(panel: &Panel, actor: &ParticipantId) -> Result<(), RosterError> {
    if &panel.meta.leader_id != actor {
        return Err(RosterError::PermissionDenied {
            actor: actor.clone(),
            panel: panel.panel_id,
        });
    }
    Ok(())
}

fn vacancy_notes(panel_id: PanelId, vacancy: &VacancyOutcome, notes: &mut Notes) {
    for intent in &vacancy.scheduled {
        tracing::debug!(
            panel_id = %panel_id,
            participant = %intent.participant_id,
            due_at = %intent.due_at,
            "Promotion scheduled"
        );
    }
    for cancelled in &vacancy.cancelled {
        tracing::debug!(
            panel_id = %panel_id,
            participant = %cancelled.intent.participant_id,
            reason = ?cancelled.reason,
            "Promotion cancelled"
        );
    }
    for entry in &vacancy.promoted {
        tracing::info!(panel_id = %panel_id, participant = %entry.participant_id, "Promoted from waitlist");
        notes.push(Notification::AutoPromoted {
            participant: entry.participant_id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use roster_model::{Placement, PromotionPolicy};

    fn engine(policy: PromotionPolicy) -> (RosterEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_762_000_000, 0).unwrap_or_default(),
        ));
        let config = RosterConfig::default()
            .with_promotion_policy(policy)
            .with_utc_offset_minutes(Some(60));
        let engine = RosterEngine::new(Arc::new(RosterStore::new()), &config).with_clock(clock.clone());
        (engine, clock)
    }

    fn request(capacity: i64) -> NewPanel {
        NewPanel {
            leader_id: "lead".into(),
            title: "Dymacho".into(),
            requirements: String::new(),
            capacity,
            date_text: "11.11.2025".into(),
            time_text: "21:00".into(),
            duration_text: "1h".into(),
        }
    }

    #[tokio::test]
    async fn create_clamps_and_rejects_bad_input() {
        let (engine, _) = engine(PromotionPolicy::Delayed);
        let created = engine.create_panel(request(50)).await.unwrap();
        assert_eq!(created.capacity, 20);
        assert!(created.clamped);

        let mut blank = request(5);
        blank.title = "  ".into();
        let err = engine.create_panel(blank).await.unwrap_err();
        assert_eq!(err, RosterError::Validation(ValidationError::EmptyField("title")));

        let mut bad_date = request(5);
        bad_date.date_text = "kiedyś".into();
        assert_eq!(engine.create_panel(bad_date).await.unwrap_err().kind(), "validation");
        assert_eq!(engine.store().len(), 1);
    }

    #[tokio::test]
    async fn rejected_action_leaves_panel_untouched() {
        let (engine, _) = engine(PromotionPolicy::Delayed);
        let id = engine.create_panel(request(2)).await.unwrap().panel_id;
        let before = engine.store().get(&id).unwrap();

        let err = engine.join(id, "1".into(), Role::Mage, 99, false).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(engine.store().get(&id).unwrap(), before);
    }

    #[tokio::test]
    async fn closed_panel_rejects_participants_but_not_admin_add() {
        let (engine, _) = engine(PromotionPolicy::Delayed);
        let id = engine.create_panel(request(2)).await.unwrap().panel_id;
        let mut panel = engine.store().get(&id).unwrap();
        panel.meta.closed = true;
        engine.store().insert(panel);

        let err = engine.join(id, "1".into(), Role::Mage, 5, false).await.unwrap_err();
        assert_eq!(err, RosterError::PanelClosed(id));
        let err = engine.withdraw(id, "1".into(), WithdrawScope::All).await.unwrap_err();
        assert_eq!(err.kind(), "panel-closed");

        let added = engine
            .admin_add(id, &"lead".into(), "1".into(), Role::Mage, 5)
            .await
            .unwrap();
        assert_eq!(added.placement, Placement::Active);
    }

    #[tokio::test]
    async fn admin_actions_require_leader() {
        let (engine, _) = engine(PromotionPolicy::Delayed);
        let id = engine.create_panel(request(2)).await.unwrap().panel_id;
        let err = engine.set_capacity(id, &"intruder".into(), 5).await.unwrap_err();
        assert_eq!(err.kind(), "permission-denied");

        engine.change_leader(id, &"lead".into(), "next".into()).await.unwrap();
        assert!(engine.set_capacity(id, &"lead".into(), 5).await.is_err());
        assert_eq!(engine.set_capacity(id, &"next".into(), 5).await.unwrap().capacity, 5);
    }

    #[tokio::test]
    async fn change_date_reopens_and_validates() {
        let (engine, _) = engine(PromotionPolicy::Delayed);
        let id = engine.create_panel(request(2)).await.unwrap().panel_id;
        let mut panel = engine.store().get(&id).unwrap();
        panel.meta.closed = true;
        engine.store().insert(panel);

        let err = engine
            .change_date(id, &"lead".into(), "nigdy".into(), "??".into(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(engine.store().get(&id).unwrap().meta.closed);

        engine
            .change_date(id, &"lead".into(), "12.11.2025".into(), "20:00".into(), Some("2h".into()))
            .await
            .unwrap();
        let meta = engine.store().get(&id).unwrap().meta;
        assert!(!meta.closed);
        assert_eq!(meta.date_text, "12.11.2025");
        assert_eq!(meta.duration_text, "2h");
    }

    #[tokio::test]
    async fn tick_closes_after_grace() {
        let (engine, clock) = engine(PromotionPolicy::Delayed);
        let created = engine.create_panel(request(2)).await.unwrap();

        let at = |minutes| created.start_at + chrono::Duration::minutes(minutes);
        assert!(engine.tick_panel(created.panel_id, at(9)).await.unwrap().is_empty());
        assert!(engine.tick_panel(created.panel_id, at(11)).await.unwrap().closed);
        assert!(!engine.tick_panel(created.panel_id, at(12)).await.unwrap().closed);

        clock.set(at(12));
        let err = engine.join(created.panel_id, "1".into(), Role::Mage, 5, false).await.unwrap_err();
        assert_eq!(err.kind(), "panel-closed");
    }

    #[tokio::test]
    async fn unknown_panel_is_not_found() {
        let (engine, _) = engine(PromotionPolicy::Immediate);
        let err = engine.tick_panel(PanelId::new(), engine.now()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
