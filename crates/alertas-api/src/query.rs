use alertas_core::types::TicketStatus;
use serde::Serialize;

/// Query parameters for the incident feed endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentParams {
    pub status: &'static str,
    pub limit: u32,
}

impl IncidentParams {
    /// The reconciliation engine only ever polls active incidents.
    pub fn active(limit: u32) -> Self {
        Self {
            status: "active",
            limit,
        }
    }
}

/// Optional filters for the ticket store endpoint. The engine fetches the
/// full set each cycle (all fields unset); the filters exist for ad-hoc use.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}
