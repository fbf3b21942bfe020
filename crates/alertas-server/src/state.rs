use alertas_core::health::{EngineHealth, OverallHealth};
use alertas_core::journal::CycleJournal;
use alertas_core::reconcile::Reconciler;
use alertas_core::types::IncidentType;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};

/// Keep the last N engine events for the `/events` endpoint.
const EVENT_LOG_CAP: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub enum EngineEvent {
    CycleCompleted {
        active: usize,
        closed: usize,
        recovered: usize,
    },
    CycleFailed {
        error: String,
    },
    IncidentClosed {
        uuid: String,
        kind: IncidentType,
    },
    OrphanRecovered {
        uuid: String,
    },
    OrphanLookupFailed {
        uuid: String,
        error: String,
    },
    RefreshRequested,
    ExportWritten {
        path: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct EventLogEntry {
    pub timestamp: chrono::DateTime<Utc>,
    pub event: EngineEvent,
}

/// Shared between the poller task (sole mutator) and the HTTP handlers
/// (readers). The locks exist for the readers; mutation is single-threaded.
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<RwLock<Reconciler>>,
    pub health: Arc<RwLock<EngineHealth>>,
    pub event_log: Arc<RwLock<VecDeque<EventLogEntry>>>,
    pub journal: Arc<RwLock<Option<CycleJournal>>>,
    pub refresh_tx: mpsc::UnboundedSender<()>,
    pub prometheus: Option<PrometheusHandle>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(refresh_tx: mpsc::UnboundedSender<()>) -> Self {
        Self {
            reconciler: Arc::new(RwLock::new(Reconciler::new())),
            health: Arc::new(RwLock::new(EngineHealth::default())),
            event_log: Arc::new(RwLock::new(VecDeque::new())),
            journal: Arc::new(RwLock::new(None)),
            refresh_tx,
            prometheus: None,
            start_time: Instant::now(),
        }
    }

    pub async fn set_journal(&self, journal: Option<CycleJournal>) {
        *self.journal.write().await = journal;
    }

    pub async fn push_event(&self, event: EngineEvent) {
        let mut log = self.event_log.write().await;
        log.push_back(EventLogEntry {
            timestamp: Utc::now(),
            event,
        });
        while log.len() > EVENT_LOG_CAP {
            log.pop_front();
        }
    }

    pub async fn get_events(&self, limit: usize) -> Vec<EventLogEntry> {
        let log = self.event_log.read().await;
        let start = log.len().saturating_sub(limit);
        log.iter().skip(start).cloned().collect()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub async fn overall_health(&self) -> OverallHealth {
        let mut engine = self.health.read().await.clone();
        {
            let reconciler = self.reconciler.read().await;
            engine.active_incidents = reconciler.current().len();
            engine.tracked_closed = reconciler.closed_history().len();
        }
        OverallHealth {
            status: engine.status(),
            engine,
            uptime_seconds: self.uptime_seconds(),
        }
    }
}
