use crate::state::{AppState, EngineEvent, EventLogEntry};
use alertas_core::labels;
use alertas_core::types::{Incident, IncidentType};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use zip::write::FileOptions;
use zip::ZipWriter;

#[derive(Deserialize)]
struct IncidentsQuery {
    #[serde(rename = "type")]
    kind: Option<IncidentType>,
}

#[derive(Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct IncidentsResponse {
    count: usize,
    incidents: Vec<Incident>,
}

#[derive(Serialize)]
struct TypeBreakdown {
    #[serde(rename = "type")]
    kind: IncidentType,
    name_es: &'static str,
    color: &'static str,
    emoji: &'static str,
    count: usize,
}

#[derive(Serialize)]
struct SummaryResponse {
    total: usize,
    with_open_tickets: usize,
    recently_closed: usize,
    by_type: Vec<TypeBreakdown>,
}

#[derive(Serialize)]
struct ExportResponse {
    path: String,
    export_id: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/incidents", get(incidents_handler))
        .route("/incidents/closed", get(closed_handler))
        .route("/summary", get(summary_handler))
        .route("/events", get(events_handler))
        .route("/refresh", post(refresh_handler))
        .route("/export", post(export_handler))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.overall_health().await)
}

async fn incidents_handler(
    State(state): State<AppState>,
    Query(params): Query<IncidentsQuery>,
) -> impl IntoResponse {
    let incidents = state
        .reconciler
        .read()
        .await
        .visible_at(Utc::now(), params.kind);
    Json(IncidentsResponse {
        count: incidents.len(),
        incidents,
    })
}

async fn closed_handler(State(state): State<AppState>) -> impl IntoResponse {
    let incidents: Vec<Incident> = state
        .reconciler
        .read()
        .await
        .closed_history()
        .iter()
        .cloned()
        .collect();
    Json(IncidentsResponse {
        count: incidents.len(),
        incidents,
    })
}

async fn summary_handler(State(state): State<AppState>) -> impl IntoResponse {
    let visible = state.reconciler.read().await.visible_at(Utc::now(), None);

    let mut counts: HashMap<IncidentType, usize> = HashMap::new();
    for incident in &visible {
        *counts.entry(incident.kind).or_insert(0) += 1;
    }
    let mut by_type: Vec<TypeBreakdown> = counts
        .into_iter()
        .map(|(kind, count)| {
            let label = labels::label(kind);
            TypeBreakdown {
                kind,
                name_es: label.name_es,
                color: label.color,
                emoji: label.emoji,
                count,
            }
        })
        .collect();
    by_type.sort_by(|a, b| b.count.cmp(&a.count).then(a.kind.as_str().cmp(b.kind.as_str())));

    Json(SummaryResponse {
        total: visible.len(),
        with_open_tickets: visible.iter().filter(|i| i.has_open_ticket).count(),
        recently_closed: visible.iter().filter(|i| i.closed_at.is_some()).count(),
        by_type,
    })
}

async fn events_handler(
    State(state): State<AppState>,
    Query(params): Query<EventsQuery>,
) -> impl IntoResponse {
    let events: Vec<EventLogEntry> = state.get_events(params.limit.unwrap_or(100)).await;
    Json(events)
}

async fn refresh_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.refresh_tx.send(()) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "poller is not running"})),
        )
            .into_response(),
    }
}

async fn export_handler(State(state): State<AppState>) -> axum::response::Response {
    let export_id = format!("export_{}", Utc::now().timestamp());
    let output_path = format!("./exports/{}.zip", export_id);

    match write_export_bundle(&state, &output_path).await {
        Ok(()) => {
            state
                .push_event(EngineEvent::ExportWritten {
                    path: output_path.clone(),
                })
                .await;
            Json(ExportResponse {
                path: output_path,
                export_id,
            })
            .into_response()
        }
        Err(e) => {
            error!("Failed to write export bundle: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": format!("Failed to write export bundle: {}", e)})),
            )
                .into_response()
        }
    }
}

async fn write_export_bundle(state: &AppState, output_path: &str) -> anyhow::Result<()> {
    if let Some(parent) = PathBuf::from(output_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let (visible, closed) = {
        let reconciler = state.reconciler.read().await;
        let visible = reconciler.visible_at(Utc::now(), None);
        let closed: Vec<Incident> = reconciler.closed_history().iter().cloned().collect();
        (visible, closed)
    };
    let health = state.overall_health().await;
    let events = state.get_events(500).await;

    let file = std::fs::File::create(output_path)?;
    let mut zip = ZipWriter::new(std::io::BufWriter::new(file));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("incidents.json", options)?;
    zip.write_all(serde_json::to_string_pretty(&visible)?.as_bytes())?;

    zip.start_file("closed.json", options)?;
    zip.write_all(serde_json::to_string_pretty(&closed)?.as_bytes())?;

    zip.start_file("health.json", options)?;
    zip.write_all(serde_json::to_string_pretty(&health)?.as_bytes())?;

    zip.start_file("events.ndjson", options)?;
    for entry in events {
        let line = serde_json::to_string(&entry)?;
        zip.write_all(line.as_bytes())?;
        zip.write_all(b"\n")?;
    }

    zip.finish()?;
    Ok(())
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "# metrics exporter not installed\n".to_string(),
        ),
    }
}
