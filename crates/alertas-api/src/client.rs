use crate::query::{IncidentParams, TicketParams};
use alertas_core::types::{Incident, Ticket};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("alertas/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("incident {uuid} not found")]
    NotFound { uuid: String },

    #[error("unauthorized (check API token)")]
    Unauthorized,
}

/// Thin typed client for the alertas backend: incident feed, incident
/// lookup, ticket store. A bearer token, when configured, rides on every
/// request.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<&str>) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("API token contains invalid header characters")?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self { base_url, http })
    }

    /// Snapshot of currently active incidents, bounded by `limit`.
    pub async fn active_incidents(&self, limit: u32) -> Result<Vec<Incident>, ApiError> {
        let url = format!("{}/incidents", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&IncidentParams::active(limit))
            .send()
            .await?;

        let response = check_status(response, None)?;
        let incidents: Vec<Incident> = response.json().await?;
        debug!(count = incidents.len(), "fetched incident snapshot");
        Ok(incidents)
    }

    /// Look up one incident by UUID in the backend's historical store.
    pub async fn incident_by_uuid(&self, uuid: &str) -> Result<Incident, ApiError> {
        let url = format!("{}/incidents/{}", self.base_url, uuid);
        let response = self.http.get(&url).send().await?;

        let response = check_status(response, Some(uuid))?;
        Ok(response.json().await?)
    }

    /// Fetch tickets, optionally filtered.
    pub async fn tickets(&self, params: &TicketParams) -> Result<Vec<Ticket>, ApiError> {
        let url = format!("{}/tickets", self.base_url);
        let response = self.http.get(&url).query(params).send().await?;

        let response = check_status(response, None)?;
        let tickets: Vec<Ticket> = response.json().await?;
        debug!(count = tickets.len(), "fetched ticket set");
        Ok(tickets)
    }
}

fn check_status(
    response: reqwest::Response,
    lookup_uuid: Option<&str>,
) -> Result<reqwest::Response, ApiError> {
    match (response.status(), lookup_uuid) {
        (StatusCode::UNAUTHORIZED, _) => Err(ApiError::Unauthorized),
        (StatusCode::NOT_FOUND, Some(uuid)) => Err(ApiError::NotFound {
            uuid: uuid.to_string(),
        }),
        _ => Ok(response.error_for_status()?),
    }
}
