//! Wiring: storage, store, engine, service and scheduler from one config

use roster_core::{
    restore, JsonFileStorage, LogSurface, PanelStorage, Persister, PromotionScheduler,
    RestoreReport, RosterConfig, RosterEngine, RosterService, RosterStore,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything a running roster needs
#[derive(Debug, Clone)]
pub(crate) struct Runtime {
    pub(crate) config: RosterConfig,
    pub(crate) store: Arc<RosterStore>,
    pub(crate) storage: Arc<dyn PanelStorage>,
    pub(crate) persister: Persister,
    pub(crate) service: RosterService,
}

impl Runtime {
    /// Build the object graph; `persist = false` keeps every change in memory
    pub(crate) fn build(config: RosterConfig, persist: bool) -> Self {
        let store = Arc::new(RosterStore::new());
        let storage: Arc<dyn PanelStorage> = Arc::new(JsonFileStorage::new(&config.storage_path));
        let persister = if persist {
            Persister::spawn(Arc::clone(&store), Arc::clone(&storage), config.save_debounce())
        } else {
            Persister::disabled()
        };
        let engine = RosterEngine::new(Arc::clone(&store), &config)
            .with_persister(persister.clone())
            .with_surface(Arc::new(LogSurface));
        let service = RosterService::new(engine, &config);

        Self {
            config,
            store,
            storage,
            persister,
            service,
        }
    }

    /// Load stored panels into the store, then settle their free slots;
    /// unreadable storage starts empty
    pub(crate) async fn restore(&self) -> RestoreReport {
        let report = restore(
            &self.store,
            self.storage.as_ref(),
            self.config.secondary_limit,
            self.config.zone(),
        )
        .await;
        self.service.engine().settle_all().await;
        report
    }

    pub(crate) fn scheduler(&self) -> PromotionScheduler {
        PromotionScheduler::new(self.service.engine().clone(), self.config.tick())
    }
}

/// Shared state behind the HTTP routes
#[derive(Debug, Clone)]
pub(crate) struct AppState {
    pub(crate) service: RosterService,
    pub(crate) store: Arc<RosterStore>,
    ready: Arc<AtomicBool>,
}

impl AppState {
    pub(crate) fn new(service: RosterService, store: Arc<RosterStore>) -> Self {
        Self {
            service,
            store,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }
}
