mod http;
mod metrics;
mod poller;
mod state;

use alertas_api::client::ApiClient;
use alertas_core::journal::CycleJournal;
use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use http::router;
use poller::PollerConfig;
use state::AppState;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "alertas")]
#[command(about = "Road-incident reconciliation service for the Alertas Viales console")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation service
    Run {
        /// Base URL of the alertas backend API
        #[arg(long, default_value = "http://127.0.0.1:3000/api/v1")]
        api_url: String,
        /// Bearer token for the backend API
        #[arg(long, env = "ALERTAS_API_TOKEN")]
        token: Option<String>,
        /// Polling interval (e.g., "60s", "2m")
        #[arg(long, default_value = "60s")]
        interval: String,
        /// Maximum incidents per feed snapshot
        #[arg(long, default_value = "200")]
        limit: u32,
        /// HTTP server address
        #[arg(long, default_value = "127.0.0.1:8080")]
        http: String,
        /// Cycle journal file path (optional)
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Run a single reconciliation cycle and print the result
    Once {
        /// Base URL of the alertas backend API
        #[arg(long, default_value = "http://127.0.0.1:3000/api/v1")]
        api_url: String,
        /// Bearer token for the backend API
        #[arg(long, env = "ALERTAS_API_TOKEN")]
        token: Option<String>,
        /// Maximum incidents per feed snapshot
        #[arg(long, default_value = "200")]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            api_url,
            token,
            interval,
            limit,
            http,
            record,
        } => {
            run_service(api_url, token, interval, limit, http, record).await?;
        }
        Commands::Once {
            api_url,
            token,
            limit,
        } => {
            run_once(api_url, token, limit).await?;
        }
    }

    Ok(())
}

async fn run_service(
    api_url: String,
    token: Option<String>,
    interval_str: String,
    limit: u32,
    http_addr: String,
    record_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    info!("Starting Alertas reconciliation service");
    info!("API: {}, interval: {}, limit: {}, HTTP: {}", api_url, interval_str, limit, http_addr);

    let interval = parse_duration(&interval_str)
        .context("Invalid polling interval format (e.g., '60s', '2m')")?;

    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus metrics recorder")?;

    let client = ApiClient::new(&api_url, token.as_deref())?;

    let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
    let mut state = AppState::new(refresh_tx);
    state.prometheus = Some(prometheus);

    if let Some(path) = record_path {
        info!("Journaling cycles to {:?}", path);
        state.set_journal(Some(CycleJournal::new(path)?)).await;
    }

    // Poller task: the only mutator of reconciliation state
    let poller_state = state.clone();
    let poller_handle = tokio::spawn(async move {
        poller::run(client, poller_state, PollerConfig { interval, limit }, refresh_rx).await;
    });

    // HTTP read API for the console
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {}", http_addr))?;
    info!("HTTP server listening on http://{}", http_addr);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = poller_handle => {
            warn!("Poller task ended");
        }
        _ = server_handle => {
            warn!("HTTP server task ended");
        }
    }

    Ok(())
}

async fn run_once(api_url: String, token: Option<String>, limit: u32) -> anyhow::Result<()> {
    let client = ApiClient::new(&api_url, token.as_deref())?;
    let (refresh_tx, _refresh_rx) = mpsc::unbounded_channel();
    let state = AppState::new(refresh_tx);

    let summary = poller::run_cycle(&client, &state, limit).await?;
    let visible = state.reconciler.read().await.visible_at(Utc::now(), None);

    let output = serde_json::json!({
        "summary": summary,
        "incidents": visible,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if let Some(mins) = s.strip_suffix('m') {
        let mins: u64 = mins.parse()?;
        Ok(Duration::from_secs(mins * 60))
    } else if let Some(secs) = s.strip_suffix('s') {
        let secs: u64 = secs.parse()?;
        Ok(Duration::from_secs(secs))
    } else {
        // Bare number means seconds
        let secs: u64 = s.parse()?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("soon").is_err());
    }
}
