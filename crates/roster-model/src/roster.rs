//! Roster transitions
//!
//! Moves entries between the active roster and the waitlist while keeping the
//! panel invariants:
//! - `active.len() <= capacity`
//! - at most one primary entry per participant
//! - at most `secondary_limit` secondary entries per participant
//! - every pending promotion points at a waitlisted participant
//!
//! Vacancies are filled according to [`PromotionPolicy`]. With
//! [`PromotionPolicy::Delayed`] a vacancy only records a [`PendingPromotion`];
//! [`Panel::apply_due_promotions`] performs the move once the delay passes.

use crate::entry::Entry;
use crate::error::{InvariantViolation, RosterOpError};
use crate::ids::ParticipantId;
use crate::panel::{clamp_capacity, Panel, PendingPromotion, DEFAULT_SECONDARY_LIMIT};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// How vacancies on the active roster get filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromotionPolicy {
    /// Fill from the waitlist the moment a slot frees up
    Immediate,
    /// Schedule a promotion and apply it after a fixed delay
    #[default]
    Delayed,
}

impl FromStr for PromotionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "delayed" => Ok(Self::Delayed),
            other => Err(format!("unknown promotion policy: '{other}'")),
        }
    }
}

/// Parameters for vacancy handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VacancyRules {
    pub policy: PromotionPolicy,
    /// Delay between a vacancy appearing and the promotion applying
    pub delay: Duration,
    pub secondary_limit: usize,
}

impl VacancyRules {
    /// Immediate filling
    #[inline]
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            policy: PromotionPolicy::Immediate,
            ..Self::default()
        }
    }

    /// Delayed filling with the given delay
    #[inline]
    #[must_use]
    pub fn delayed(delay: Duration) -> Self {
        Self {
            policy: PromotionPolicy::Delayed,
            delay,
            ..Self::default()
        }
    }

    /// With secondary registration cap
    #[inline]
    #[must_use]
    pub fn with_secondary_limit(mut self, limit: usize) -> Self {
        self.secondary_limit = limit;
        self
    }
}

impl Default for VacancyRules {
    fn default() -> Self {
        Self {
            policy: PromotionPolicy::Delayed,
            delay: Duration::minutes(5),
            secondary_limit: DEFAULT_SECONDARY_LIMIT,
        }
    }
}

/// Which list received a new entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Placement {
    Active,
    Waitlist,
}

/// Which of a participant's entries a withdrawal removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithdrawScope {
    Primary,
    Secondary,
    All,
}

impl WithdrawScope {
    #[inline]
    fn matches(self, entry: &Entry) -> bool {
        match self {
            WithdrawScope::Primary => !entry.is_secondary,
            WithdrawScope::Secondary => entry.is_secondary,
            WithdrawScope::All => true,
        }
    }
}

/// Why a pending promotion was dropped without being applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Withdrawn,
    Reregistered,
    AdminPromoted,
    Demoted,
    NoVacancy,
    /// Participant is no longer on the waitlist
    Departed,
}

/// A pending promotion that ended in `Cancelled`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledIntent {
    pub intent: PendingPromotion,
    pub reason: CancelReason,
}

/// Result of evaluating vacancies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VacancyOutcome {
    /// Entries moved to the active roster
    pub promoted: Vec<Entry>,
    /// Promotions newly scheduled
    pub scheduled: Vec<PendingPromotion>,
    /// Promotions dropped
    pub cancelled: Vec<CancelledIntent>,
}

impl VacancyOutcome {
    /// Nothing was promoted, scheduled or cancelled
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty() && self.scheduled.is_empty() && self.cancelled.is_empty()
    }

    fn with_cancelled_first(mut self, mut earlier: Vec<CancelledIntent>) -> Self {
        earlier.append(&mut self.cancelled);
        self.cancelled = earlier;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub placement: Placement,
    /// Previous primary entry that the join overwrote
    pub replaced: Option<Entry>,
    pub vacancy: VacancyOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawOutcome {
    pub removed: Vec<Entry>,
    pub vacancy: VacancyOutcome,
}

impl WithdrawOutcome {
    /// Nothing matched the withdrawal
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminPromoteOutcome {
    pub promoted: Entry,
    /// Active tail that yielded its slot
    pub bumped: Option<Entry>,
    pub vacancy: VacancyOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoteOutcome {
    pub demoted: Entry,
    pub vacancy: VacancyOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeOutcome {
    pub previous: u8,
    pub capacity: u8,
    /// Entries moved from the active tail to the waitlist head
    pub overflow: Vec<Entry>,
    pub vacancy: VacancyOutcome,
}

impl Panel {
    /// Register an entry
    ///
    /// A primary entry replaces the participant's previous primary entry and
    /// lands at the tail of whichever list has room. Secondary entries are
    /// capped at `rules.secondary_limit`.
    ///
    /// # Errors
    /// - `RosterOpError::SecondaryLimit` if the secondary cap is reached
    pub fn join(
        &mut self,
        entry: Entry,
        rules: &VacancyRules,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, RosterOpError> {
        let participant = entry.participant_id.clone();
        let mut cancelled = Vec::new();
        let mut replaced = None;

        if entry.is_secondary {
            if self.secondary_count(&participant) >= rules.secondary_limit {
                return Err(RosterOpError::SecondaryLimit {
                    participant,
                    limit: rules.secondary_limit,
                });
            }
        } else {
            replaced = self.take_primary(&participant);
            cancelled = self.cancel_intents_for(&participant, CancelReason::Reregistered);
        }

        let placement = self.place(entry);
        let vacancy = self
            .evaluate_vacancies(rules, now, None)
            .with_cancelled_first(cancelled);

        Ok(JoinOutcome {
            placement,
            replaced,
            vacancy,
        })
    }

    /// Remove the participant's entries matching `scope`
    ///
    /// Withdrawing someone with no matching entry changes nothing.
    pub fn withdraw(
        &mut self,
        participant: &ParticipantId,
        scope: WithdrawScope,
        rules: &VacancyRules,
        now: DateTime<Utc>,
    ) -> WithdrawOutcome {
        let mut removed = Vec::new();
        for list in [&mut self.active, &mut self.waitlist] {
            let mut kept = Vec::with_capacity(list.len());
            for entry in list.drain(..) {
                if entry.is_for(participant) && scope.matches(&entry) {
                    removed.push(entry);
                } else {
                    kept.push(entry);
                }
            }
            *list = kept;
        }

        if removed.is_empty() {
            return WithdrawOutcome {
                removed,
                vacancy: VacancyOutcome::default(),
            };
        }

        let cancelled = self.cancel_intents_for(participant, CancelReason::Withdrawn);
        let vacancy = self
            .evaluate_vacancies(rules, now, None)
            .with_cancelled_first(cancelled);

        WithdrawOutcome { removed, vacancy }
    }

    /// Move the participant's earliest waitlist entry onto the active roster
    /// right away. When the roster is full its tail yields to the waitlist head.
    ///
    /// # Errors
    /// - `RosterOpError::NotInWaitlist` if the participant is not waitlisted
    pub fn admin_promote(
        &mut self,
        participant: &ParticipantId,
        rules: &VacancyRules,
        now: DateTime<Utc>,
    ) -> Result<AdminPromoteOutcome, RosterOpError> {
        let idx = self
            .waitlist
            .iter()
            .position(|e| e.is_for(participant))
            .ok_or_else(|| RosterOpError::NotInWaitlist(participant.clone()))?;

        let promoted = self.waitlist.remove(idx);
        let bumped = if self.is_full() {
            let tail = self.active.pop();
            if let Some(tail) = &tail {
                self.waitlist.insert(0, tail.clone());
            }
            tail
        } else {
            None
        };

        let cancelled = self.cancel_intents_for(participant, CancelReason::AdminPromoted);
        self.active.push(promoted.clone());
        let vacancy = self
            .evaluate_vacancies(rules, now, None)
            .with_cancelled_first(cancelled);

        Ok(AdminPromoteOutcome {
            promoted,
            bumped,
            vacancy,
        })
    }

    /// Move the participant's earliest active entry to the head of the
    /// waitlist. The demoted participant is not a candidate for the slot this
    /// frees.
    ///
    /// # Errors
    /// - `RosterOpError::NotInActive` if the participant is not on the roster
    pub fn admin_demote(
        &mut self,
        participant: &ParticipantId,
        rules: &VacancyRules,
        now: DateTime<Utc>,
    ) -> Result<DemoteOutcome, RosterOpError> {
        let idx = self
            .active
            .iter()
            .position(|e| e.is_for(participant))
            .ok_or_else(|| RosterOpError::NotInActive(participant.clone()))?;

        let demoted = self.active.remove(idx);
        self.waitlist.insert(0, demoted.clone());

        let cancelled = self.cancel_intents_for(participant, CancelReason::Demoted);
        let vacancy = self
            .evaluate_vacancies(rules, now, Some(participant))
            .with_cancelled_first(cancelled);

        Ok(DemoteOutcome { demoted, vacancy })
    }

    /// Change capacity (clamped). Overflow moves, in order, to the waitlist head.
    pub fn resize(&mut self, requested: i64, rules: &VacancyRules, now: DateTime<Utc>) -> ResizeOutcome {
        let previous = self.capacity;
        self.capacity = clamp_capacity(requested);

        let keep = usize::from(self.capacity);
        let overflow = if self.active.len() > keep {
            self.active.split_off(keep)
        } else {
            Vec::new()
        };
        self.waitlist.splice(0..0, overflow.iter().cloned());

        let cancelled = if self.free_slots() == 0 {
            self.drain_intents(CancelReason::NoVacancy)
        } else {
            Vec::new()
        };
        let vacancy = self
            .evaluate_vacancies(rules, now, None)
            .with_cancelled_first(cancelled);

        ResizeOutcome {
            previous,
            capacity: self.capacity,
            overflow,
            vacancy,
        }
    }

    /// Fill or schedule vacancies according to `rules.policy`
    ///
    /// Stale promotions are pruned first. Under the delayed policy every free
    /// slot not already covered by a pending promotion schedules one for the
    /// next waitlisted participant without one. `exclude` is never a candidate.
    pub fn evaluate_vacancies(
        &mut self,
        rules: &VacancyRules,
        now: DateTime<Utc>,
        exclude: Option<&ParticipantId>,
    ) -> VacancyOutcome {
        let mut outcome = VacancyOutcome {
            cancelled: self.prune_intents(),
            ..VacancyOutcome::default()
        };

        match rules.policy {
            PromotionPolicy::Immediate => {
                while self.free_slots() > 0 {
                    let Some(idx) = self
                        .waitlist
                        .iter()
                        .position(|e| Some(&e.participant_id) != exclude)
                    else {
                        break;
                    };
                    let entry = self.waitlist.remove(idx);
                    self.active.push(entry.clone());
                    outcome.promoted.push(entry);
                }
                outcome.cancelled.extend(self.prune_intents());
            }
            PromotionPolicy::Delayed => {
                let mut free = self
                    .free_slots()
                    .saturating_sub(self.meta.pending_promotions.len());
                let due_at = now + rules.delay;

                for participant in Panel::distinct_participants(&self.waitlist) {
                    if free == 0 {
                        break;
                    }
                    if Some(&participant) == exclude || self.has_pending(&participant) {
                        continue;
                    }
                    let intent = PendingPromotion {
                        participant_id: participant,
                        due_at,
                    };
                    self.meta.pending_promotions.push(intent.clone());
                    outcome.scheduled.push(intent);
                    free -= 1;
                }
            }
        }

        outcome
    }

    /// Apply pending promotions whose delay has elapsed, in scheduling order,
    /// while free slots remain. Undue promotions and promotions without a free
    /// slot stay recorded.
    pub fn apply_due_promotions(&mut self, now: DateTime<Utc>) -> VacancyOutcome {
        let mut outcome = VacancyOutcome {
            cancelled: self.prune_intents(),
            ..VacancyOutcome::default()
        };

        let due: Vec<ParticipantId> = self
            .meta
            .pending_promotions
            .iter()
            .filter(|p| p.is_due(now))
            .map(|p| p.participant_id.clone())
            .collect();

        for participant in due {
            if self.is_full() {
                break;
            }
            let Some(idx) = self.waitlist.iter().position(|e| e.is_for(&participant)) else {
                continue;
            };
            let entry = self.waitlist.remove(idx);
            self.active.push(entry.clone());
            self.meta
                .pending_promotions
                .retain(|p| p.participant_id != participant);
            outcome.promoted.push(entry);
        }

        outcome
    }

    /// Close signups once `start + grace` has passed. Returns true if this call
    /// closed the panel.
    pub fn close_if_due(&mut self, now: DateTime<Utc>, grace: Duration) -> bool {
        match self.meta.start_at {
            Some(start) if !self.meta.closed && now >= start + grace => {
                self.meta.closed = true;
                true
            }
            _ => false,
        }
    }

    /// Drop the participant's pending promotions
    pub fn cancel_intents_for(
        &mut self,
        participant: &ParticipantId,
        reason: CancelReason,
    ) -> Vec<CancelledIntent> {
        let (dropped, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.meta.pending_promotions)
            .into_iter()
            .partition(|p| &p.participant_id == participant);
        self.meta.pending_promotions = kept;
        dropped
            .into_iter()
            .map(|intent| CancelledIntent { intent, reason })
            .collect()
    }

    /// Drop pending promotions for participants that are no longer waitlisted,
    /// and duplicates for the same participant
    pub fn prune_intents(&mut self) -> Vec<CancelledIntent> {
        let waitlisted: HashSet<&ParticipantId> =
            self.waitlist.iter().map(|e| &e.participant_id).collect();
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        let mut cancelled = Vec::new();

        for intent in std::mem::take(&mut self.meta.pending_promotions) {
            if waitlisted.contains(&intent.participant_id) && seen.insert(intent.participant_id.clone()) {
                kept.push(intent);
            } else {
                cancelled.push(CancelledIntent {
                    intent,
                    reason: CancelReason::Departed,
                });
            }
        }

        self.meta.pending_promotions = kept;
        cancelled
    }

    /// Repair a panel that came from outside the engine (disk, recovered text)
    ///
    /// Clamps tiers, keeps only the first primary and the first
    /// `secondary_limit` secondaries per participant, moves overflow to the
    /// waitlist head and prunes stale promotions. Returns the dropped entries.
    pub fn normalize(&mut self, secondary_limit: usize) -> Vec<Entry> {
        self.capacity = clamp_capacity(i64::from(self.capacity));

        let mut primaries = HashSet::new();
        let mut secondaries: HashMap<ParticipantId, usize> = HashMap::new();
        let mut dropped = Vec::new();

        for list in [&mut self.active, &mut self.waitlist] {
            let mut kept = Vec::with_capacity(list.len());
            for mut entry in list.drain(..) {
                entry.tier = entry.role.clamp_tier(entry.tier);
                let admit = if entry.is_secondary {
                    let held = secondaries.entry(entry.participant_id.clone()).or_default();
                    *held += 1;
                    *held <= secondary_limit
                } else {
                    primaries.insert(entry.participant_id.clone())
                };
                if admit {
                    kept.push(entry);
                } else {
                    dropped.push(entry);
                }
            }
            *list = kept;
        }

        let keep = usize::from(self.capacity);
        if self.active.len() > keep {
            let overflow = self.active.split_off(keep);
            self.waitlist.splice(0..0, overflow);
        }

        self.prune_intents();
        dropped
    }

    /// Verify the structural invariants
    ///
    /// # Errors
    /// Returns the first violation found
    pub fn check_invariants(&self, secondary_limit: usize) -> Result<(), InvariantViolation> {
        if self.active.len() > usize::from(self.capacity) {
            return Err(InvariantViolation::OverCapacity {
                len: self.active.len(),
                capacity: self.capacity,
            });
        }

        let mut primaries = HashSet::new();
        let mut secondaries: HashMap<&ParticipantId, usize> = HashMap::new();
        for entry in self.entries() {
            if entry.role.validate_tier(entry.tier).is_err() {
                return Err(InvariantViolation::TierOutOfRange {
                    role: entry.role,
                    tier: entry.tier,
                });
            }
            if entry.is_secondary {
                let count = secondaries.entry(&entry.participant_id).or_default();
                *count += 1;
                if *count > secondary_limit {
                    return Err(InvariantViolation::TooManySecondaries {
                        participant: entry.participant_id.clone(),
                        count: *count,
                        limit: secondary_limit,
                    });
                }
            } else if !primaries.insert(&entry.participant_id) {
                return Err(InvariantViolation::DuplicatePrimary(entry.participant_id.clone()));
            }
        }

        for intent in &self.meta.pending_promotions {
            if !self.is_waitlisted(&intent.participant_id) {
                return Err(InvariantViolation::StaleIntent(intent.participant_id.clone()));
            }
        }

        Ok(())
    }

    fn place(&mut self, entry: Entry) -> Placement {
        if self.is_full() {
            self.waitlist.push(entry);
            Placement::Waitlist
        } else {
            self.active.push(entry);
            Placement::Active
        }
    }

    fn take_primary(&mut self, participant: &ParticipantId) -> Option<Entry> {
        let mut taken = None;
        for list in [&mut self.active, &mut self.waitlist] {
            if let Some(idx) = list.iter().position(|e| e.is_for(participant) && !e.is_secondary) {
                let entry = list.remove(idx);
                taken.get_or_insert(entry);
            }
        }
        taken
    }

    fn drain_intents(&mut self, reason: CancelReason) -> Vec<CancelledIntent> {
        std::mem::take(&mut self.meta.pending_promotions)
            .into_iter()
            .map(|intent| CancelledIntent { intent, reason })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Role;
    use crate::panel::PanelMeta;
    use pretty_assertions::assert_eq;

    fn pid(id: &str) -> ParticipantId {
        ParticipantId::from(id)
    }

    fn primary(id: &str) -> Entry {
        Entry::primary(pid(id), Role::Archer, 3).unwrap()
    }

    fn alt(id: &str) -> Entry {
        Entry::secondary(pid(id), Role::Mage, 2).unwrap()
    }

    fn ids(list: &[Entry]) -> Vec<&str> {
        list.iter().map(|e| e.participant_id.as_str()).collect()
    }

    fn panel(capacity: i64, active: &[&str], waitlist: &[&str]) -> Panel {
        let mut panel = Panel::new(capacity, PanelMeta::new(pid("leader"), "Raid"));
        panel.active = active.iter().map(|id| primary(id)).collect();
        panel.waitlist = waitlist.iter().map(|id| primary(id)).collect();
        panel
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_762_891_200, 0).unwrap()
    }

    #[test]
    fn join_fills_active_then_waitlist() {
        let mut p = panel(2, &[], &[]);
        let rules = VacancyRules::default();
        for (id, expected) in [("a", Placement::Active), ("b", Placement::Active), ("c", Placement::Waitlist)] {
            assert_eq!(p.join(primary(id), &rules, t0()).unwrap().placement, expected);
        }
        assert_eq!(ids(&p.active), vec!["a", "b"]);
        assert_eq!(ids(&p.waitlist), vec!["c"]);
    }

    #[test]
    fn rejoin_replaces_primary_and_moves_to_tail() {
        let mut p = panel(3, &["a", "b", "c"], &[]);
        let rules = VacancyRules::default();
        let swapped = Entry::primary(pid("a"), Role::Martial, 6).unwrap();

        let outcome = p.join(swapped, &rules, t0()).unwrap();

        assert_eq!(outcome.placement, Placement::Active);
        assert_eq!(outcome.replaced.unwrap().role, Role::Archer);
        assert_eq!(ids(&p.active), vec!["b", "c", "a"]);
        assert_eq!(p.active[2].role, Role::Martial);
    }

    #[test]
    fn secondary_cap_rejects_fourth_alt_without_change() {
        let mut p = panel(10, &[], &[]);
        let rules = VacancyRules::default();
        for _ in 0..3 {
            p.join(alt("a"), &rules, t0()).unwrap();
        }
        let before = p.clone();

        let err = p.join(alt("a"), &rules, t0()).unwrap_err();

        assert!(matches!(err, RosterOpError::SecondaryLimit { limit: 3, .. }));
        assert_eq!(p, before);
    }

    #[test]
    fn secondary_does_not_replace_primary() {
        let mut p = panel(5, &["a"], &[]);
        p.join(alt("a"), &VacancyRules::default(), t0()).unwrap();
        assert_eq!(p.active.len(), 2);
    }

    #[test]
    fn withdraw_unknown_is_noop() {
        let mut p = panel(2, &["a"], &["b"]);
        let before = p.clone();
        let outcome = p.withdraw(&pid("zzz"), WithdrawScope::All, &VacancyRules::default(), t0());
        assert!(outcome.is_noop());
        assert!(outcome.vacancy.is_empty());
        assert_eq!(p, before);
    }

    #[test]
    fn withdraw_scopes() {
        let rules = VacancyRules::immediate();
        let mut p = panel(10, &["a"], &[]);
        p.join(alt("a"), &rules, t0()).unwrap();
        p.join(alt("a"), &rules, t0()).unwrap();

        let secondary = p.withdraw(&pid("a"), WithdrawScope::Secondary, &rules, t0());
        assert_eq!(secondary.removed.len(), 2);
        assert_eq!(p.active.len(), 1);

        p.join(alt("a"), &rules, t0()).unwrap();
        let primary = p.withdraw(&pid("a"), WithdrawScope::Primary, &rules, t0());
        assert_eq!(primary.removed.len(), 1);
        assert!(p.active[0].is_secondary);

        let all = p.withdraw(&pid("a"), WithdrawScope::All, &rules, t0());
        assert_eq!(all.removed.len(), 1);
        assert!(p.active.is_empty());
    }

    #[test]
    fn immediate_policy_fills_vacancy_in_order() {
        let mut p = panel(2, &["a", "b"], &["c", "d"]);
        let outcome = p.withdraw(&pid("a"), WithdrawScope::All, &VacancyRules::immediate(), t0());
        assert_eq!(ids(&outcome.vacancy.promoted), vec!["c"]);
        assert_eq!(ids(&p.active), vec!["b", "c"]);
        assert_eq!(ids(&p.waitlist), vec!["d"]);
    }

    #[test]
    fn delayed_policy_schedules_then_applies() {
        let rules = VacancyRules::delayed(Duration::minutes(5));
        let mut p = panel(1, &["a"], &["b"]);

        let outcome = p.withdraw(&pid("a"), WithdrawScope::All, &rules, t0());
        assert_eq!(outcome.vacancy.scheduled.len(), 1);
        assert_eq!(outcome.vacancy.scheduled[0].due_at, t0() + Duration::minutes(5));
        assert!(p.active.is_empty());

        let early = p.apply_due_promotions(t0() + Duration::seconds(299));
        assert!(early.promoted.is_empty());
        assert_eq!(ids(&p.waitlist), vec!["b"]);

        let late = p.apply_due_promotions(t0() + Duration::seconds(301));
        assert_eq!(ids(&late.promoted), vec!["b"]);
        assert_eq!(ids(&p.active), vec!["b"]);
        assert!(p.meta.pending_promotions.is_empty());
    }

    #[test]
    fn withdrawal_cancels_pending_promotion() {
        let rules = VacancyRules::delayed(Duration::minutes(5));
        let mut p = panel(1, &["a"], &["b"]);
        p.withdraw(&pid("a"), WithdrawScope::All, &rules, t0());

        let outcome = p.withdraw(&pid("b"), WithdrawScope::All, &rules, t0() + Duration::minutes(1));
        assert_eq!(outcome.vacancy.cancelled[0].reason, CancelReason::Withdrawn);

        let tick = p.apply_due_promotions(t0() + Duration::seconds(301));
        assert!(tick.promoted.is_empty());
        assert!(p.active.is_empty());
    }

    #[test]
    fn pending_stays_when_vacancy_closes_before_due() {
        let rules = VacancyRules::delayed(Duration::minutes(5));
        let mut p = panel(2, &["a", "b"], &["c"]);
        p.withdraw(&pid("a"), WithdrawScope::All, &rules, t0());
        // a newcomer takes the free slot directly
        assert_eq!(p.join(primary("d"), &rules, t0()).unwrap().placement, Placement::Active);

        let tick = p.apply_due_promotions(t0() + Duration::minutes(6));
        assert!(tick.promoted.is_empty());
        assert_eq!(ids(&p.waitlist), vec!["c"]);
        assert!(p.has_pending(&pid("c")));
    }

    #[test]
    fn admin_promote_cancels_pending() {
        let rules = VacancyRules::delayed(Duration::minutes(5));
        let mut p = panel(1, &["a"], &["b"]);
        p.withdraw(&pid("a"), WithdrawScope::All, &rules, t0());

        let outcome = p.admin_promote(&pid("b"), &rules, t0()).unwrap();
        assert_eq!(outcome.vacancy.cancelled[0].reason, CancelReason::AdminPromoted);
        assert!(p.meta.pending_promotions.is_empty());
    }

    #[test]
    fn delayed_schedules_one_intent_per_uncovered_slot() {
        let rules = VacancyRules::delayed(Duration::minutes(5));
        let mut p = panel(3, &["a", "b", "c"], &["d", "e", "f"]);

        p.withdraw(&pid("a"), WithdrawScope::All, &rules, t0());
        p.withdraw(&pid("b"), WithdrawScope::All, &rules, t0() + Duration::minutes(1));

        let due: Vec<_> = p
            .meta
            .pending_promotions
            .iter()
            .map(|i| (i.participant_id.as_str(), i.due_at))
            .collect();
        assert_eq!(
            due,
            vec![
                ("d", t0() + Duration::minutes(5)),
                ("e", t0() + Duration::minutes(6)),
            ]
        );
    }

    #[test]
    fn admin_promote_bumps_tail_to_waitlist_head() {
        let mut p = panel(1, &["a"], &["b"]);
        let outcome = p.admin_promote(&pid("b"), &VacancyRules::default(), t0()).unwrap();
        assert_eq!(outcome.bumped.unwrap().participant_id.as_str(), "a");
        assert_eq!(ids(&p.active), vec!["b"]);
        assert_eq!(ids(&p.waitlist), vec!["a"]);
    }

    #[test]
    fn admin_promote_requires_waitlisted_target() {
        let mut p = panel(1, &["a"], &[]);
        let err = p.admin_promote(&pid("a"), &VacancyRules::default(), t0()).unwrap_err();
        assert_eq!(err, RosterOpError::NotInWaitlist(pid("a")));
    }

    #[test]
    fn admin_demote_puts_entry_at_waitlist_head() {
        let mut p = panel(2, &["a", "b"], &["c"]);
        let outcome = p.admin_demote(&pid("a"), &VacancyRules::immediate(), t0()).unwrap();
        assert_eq!(outcome.demoted.participant_id.as_str(), "a");
        // c fills the freed slot, a keeps the head of the queue
        assert_eq!(ids(&p.active), vec!["b", "c"]);
        assert_eq!(ids(&p.waitlist), vec!["a"]);
    }

    #[test]
    fn admin_demote_does_not_reschedule_demoted() {
        let rules = VacancyRules::delayed(Duration::minutes(5));
        let mut p = panel(1, &["a"], &[]);
        let outcome = p.admin_demote(&pid("a"), &rules, t0()).unwrap();
        assert!(outcome.vacancy.scheduled.is_empty());
        assert_eq!(ids(&p.waitlist), vec!["a"]);
    }

    #[test]
    fn admin_demote_requires_active_target() {
        let mut p = panel(1, &[], &["a"]);
        let err = p.admin_demote(&pid("a"), &VacancyRules::default(), t0()).unwrap_err();
        assert_eq!(err, RosterOpError::NotInActive(pid("a")));
    }

    #[test]
    fn shrink_moves_overflow_to_waitlist_head_in_order() {
        let mut p = panel(4, &["a", "b", "c", "d"], &["e"]);
        let outcome = p.resize(2, &VacancyRules::default(), t0());
        assert_eq!(outcome.previous, 4);
        assert_eq!(outcome.capacity, 2);
        assert_eq!(ids(&p.active), vec!["a", "b"]);
        assert_eq!(ids(&p.waitlist), vec!["c", "d", "e"]);
    }

    #[test]
    fn shrink_without_vacancy_cancels_pending() {
        let rules = VacancyRules::delayed(Duration::minutes(5));
        let mut p = panel(2, &["a", "b"], &["c"]);
        p.withdraw(&pid("a"), WithdrawScope::All, &rules, t0());
        assert_eq!(p.meta.pending_promotions.len(), 1);

        let outcome = p.resize(1, &rules, t0());
        assert_eq!(outcome.vacancy.cancelled[0].reason, CancelReason::NoVacancy);
        assert!(p.meta.pending_promotions.is_empty());
    }

    #[test]
    fn grow_fills_immediately_under_immediate_policy() {
        let mut p = panel(1, &["a"], &["b", "c"]);
        let outcome = p.resize(3, &VacancyRules::immediate(), t0());
        assert_eq!(ids(&outcome.vacancy.promoted), vec!["b", "c"]);
        assert!(p.waitlist.is_empty());
    }

    #[test]
    fn resize_is_clamped() {
        let mut p = panel(5, &[], &[]);
        assert_eq!(p.resize(99, &VacancyRules::default(), t0()).capacity, 20);
        assert_eq!(p.resize(0, &VacancyRules::default(), t0()).capacity, 1);
    }

    #[test]
    fn close_after_grace() {
        let mut p = panel(1, &[], &[]);
        p.meta.start_at = Some(t0());
        let grace = Duration::minutes(10);
        assert!(!p.close_if_due(t0() + Duration::minutes(9), grace));
        assert!(p.close_if_due(t0() + Duration::minutes(10), grace));
        assert!(!p.close_if_due(t0() + Duration::minutes(11), grace));
        assert!(p.meta.closed);
    }

    #[test]
    fn panel_without_start_never_closes() {
        let mut p = panel(1, &[], &[]);
        assert!(!p.close_if_due(t0() + Duration::days(365), Duration::minutes(10)));
    }

    #[test]
    fn normalize_repairs_foreign_state() {
        let mut p = panel(2, &["a", "b", "a"], &["c"]);
        p.active.push(Entry::clamped(pid("d"), Role::Martial, 99, false));
        for _ in 0..4 {
            p.waitlist.push(alt("e"));
        }
        p.meta.pending_promotions.push(PendingPromotion {
            participant_id: pid("gone"),
            due_at: t0(),
        });

        let dropped = p.normalize(3);

        assert_eq!(dropped.len(), 2);
        assert_eq!(ids(&p.active), vec!["a", "b"]);
        assert_eq!(&ids(&p.waitlist)[..2], &["d", "c"]);
        assert_eq!(p.waitlist[0].tier, 7);
        assert!(p.meta.pending_promotions.is_empty());
        assert!(p.check_invariants(3).is_ok());
    }

    #[test]
    fn invariant_check_flags_stale_intent() {
        let mut p = panel(1, &["a"], &[]);
        p.meta.pending_promotions.push(PendingPromotion {
            participant_id: pid("a"),
            due_at: t0(),
        });
        assert_eq!(
            p.check_invariants(3),
            Err(InvariantViolation::StaleIntent(pid("a")))
        );
    }

    #[test]
    fn policy_parses() {
        assert_eq!("Immediate".parse::<PromotionPolicy>().unwrap(), PromotionPolicy::Immediate);
        assert_eq!("delayed".parse::<PromotionPolicy>().unwrap(), PromotionPolicy::Delayed);
        assert!("soon".parse::<PromotionPolicy>().is_err());
    }
}
