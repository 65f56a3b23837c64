//! Promotion scheduler
//!
//! Fixed-period task that, for every stored panel and under that panel's
//! lock, applies due promotion intents and closes signups once the start
//! grace period has passed. A failing panel is logged and skipped; the tick
//! always continues with the remaining panels.

use crate::engine::RosterEngine;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Totals for one scheduler pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub panels: usize,
    pub promoted: usize,
    pub closed: usize,
    pub failed: usize,
}

/// Periodic driver for [`RosterEngine::tick_panel`]
#[derive(Debug, Clone)]
pub struct PromotionScheduler {
    engine: RosterEngine,
    tick: Duration,
}

impl PromotionScheduler {
    #[must_use]
    pub fn new(engine: RosterEngine, tick: Duration) -> Self {
        Self { engine, tick }
    }

    #[inline]
    #[must_use]
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// One pass over every stored panel at `now`
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        for panel_id in self.engine.store().ids() {
            report.panels += 1;
            match self.engine.tick_panel(panel_id, now).await {
                Ok(outcome) => {
                    report.promoted += outcome.promoted.len();
                    report.closed += usize::from(outcome.closed);
                }
                // removed between listing and locking
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(panel_id = %panel_id, error = %e, "Scheduler tick failed for panel");
                }
            }
        }
        if report.promoted > 0 || report.closed > 0 {
            tracing::debug!(
                panels = report.panels,
                promoted = report.promoted,
                closed = report.closed,
                "Scheduler tick"
            );
        }
        report
    }

    /// Run on a background task until the handle is shut down
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(self) -> SchedulerHandle {
        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(tick = ?self.tick, "Promotion scheduler started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.run_tick(self.engine.now()).await;
                    }
                    _ = stopped.changed() => break,
                }
            }
            tracing::info!("Promotion scheduler stopped");
        });
        SchedulerHandle { stop, task }
    }
}

/// Stops a spawned [`PromotionScheduler`]
#[derive(Debug)]
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the task and wait for the tick in progress to finish
    ///
    /// Dropping the handle also stops the task, without waiting.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Promotion scheduler task failed");
        }
    }
}
