use crate::metrics;
use crate::state::{AppState, EngineEvent};
use alertas_api::client::ApiClient;
use alertas_api::query::TicketParams;
use alertas_core::journal::CycleRecord;
use alertas_core::reconcile::CycleSummary;
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub limit: u32,
}

/// Drive the reconciliation engine: one cycle at startup, then one per tick,
/// plus any user-triggered refreshes. Cycles are consumed inline on this
/// task, so two can never overlap; a slow cycle delays the next tick.
pub async fn run(
    client: ApiClient,
    state: AppState,
    config: PollerConfig,
    mut refresh_rx: mpsc::UnboundedReceiver<()>,
) {
    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            refresh = refresh_rx.recv() => {
                if refresh.is_none() {
                    info!("Refresh channel closed, stopping poller");
                    break;
                }
                state.push_event(EngineEvent::RefreshRequested).await;
            }
        }

        if let Err(e) = run_cycle(&client, &state, config.limit).await {
            error!("Reconciliation cycle failed: {:#}", e);
        }
    }
}

/// One full fetch-merge-commit cycle. On fetch failure the previous
/// in-memory state is left untouched and the error is surfaced; the next
/// tick retries.
pub async fn run_cycle(
    client: &ApiClient,
    state: &AppState,
    limit: u32,
) -> anyhow::Result<CycleSummary> {
    let started = Instant::now();
    let now = Utc::now();

    let ticket_params = TicketParams::default();
    let fetched = tokio::try_join!(
        client.active_incidents(limit),
        client.tickets(&ticket_params),
    );
    let (feed, tickets) = match fetched {
        Ok(pair) => pair,
        Err(e) => {
            let message = e.to_string();
            metrics::record_cycle_failed();
            state.health.write().await.record_failure(&message);
            state
                .push_event(EngineEvent::CycleFailed {
                    error: message.clone(),
                })
                .await;
            if let Some(journal) = state.journal.write().await.as_mut() {
                let _ = journal.record(&CycleRecord::failure(now, &message));
            }
            return Err(e.into());
        }
    };

    let mut plan = { state.reconciler.read().await.plan_cycle(&feed, &tickets, now) };

    // Orphan lookups run one at a time to bound backend load; a failed
    // lookup forfeits that one incident only.
    let mut lookup_failures = 0usize;
    for uuid in plan.take_pending_lookups() {
        match client.incident_by_uuid(&uuid).await {
            Ok(incident) => {
                metrics::record_orphan_recovered();
                state
                    .push_event(EngineEvent::OrphanRecovered { uuid: uuid.clone() })
                    .await;
                plan.resolve_orphan(incident);
            }
            Err(e) => {
                warn!("Orphan lookup for {} failed: {}", uuid, e);
                lookup_failures += 1;
                metrics::record_lookup_failure();
                state
                    .push_event(EngineEvent::OrphanLookupFailed {
                        uuid,
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    }

    let mut summary = { state.reconciler.write().await.commit(plan) };
    summary.lookup_failures = lookup_failures;

    for incident in &summary.closed_incidents {
        metrics::record_incident_closed(incident.kind);
        state
            .push_event(EngineEvent::IncidentClosed {
                uuid: incident.uuid.clone(),
                kind: incident.kind,
            })
            .await;
    }

    state
        .push_event(EngineEvent::CycleCompleted {
            active: summary.active,
            closed: summary.closed,
            recovered: summary.recovered,
        })
        .await;
    state.health.write().await.record_success(&summary);

    metrics::record_cycle_ok();
    metrics::record_cycle_duration(started.elapsed().as_secs_f64() * 1000.0);
    {
        let reconciler = state.reconciler.read().await;
        metrics::update_incident_gauges(
            reconciler.current().len(),
            reconciler.closed_history().len(),
        );
    }
    if let Some(journal) = state.journal.write().await.as_mut() {
        let _ = journal.record(&CycleRecord::success(now, &summary));
    }

    info!(
        active = summary.active,
        recovered = summary.recovered,
        carried = summary.carried,
        closed = summary.closed,
        lookup_failures = summary.lookup_failures,
        "reconciliation cycle completed"
    );

    Ok(summary)
}
