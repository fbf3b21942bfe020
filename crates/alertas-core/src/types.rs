use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One traffic condition report from the upstream feed.
///
/// The feed-local `id` may be reused when the backend rotates records; `uuid`
/// is the stable identity across feed disappearance. The trailing fields are
/// annotations maintained by the reconciliation engine and never arrive in
/// feed payloads, hence the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub uuid: String,
    #[serde(rename = "type")]
    pub kind: IncidentType,
    pub subtype: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_int")]
    pub priority: Option<i32>,
    pub status: IncidentStatus,
    pub pub_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_lenient_int")]
    pub reliability: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_lenient_int")]
    pub confidence: Option<i32>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub has_open_ticket: bool,
    #[serde(default)]
    pub ticket_count: u32,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_by: Option<String>,
}

/// Some backends emit numeric fields as strings (or garbage); a malformed
/// priority/reliability must never make the whole snapshot unparseable.
fn deserialize_lenient_int<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: serde_json::Value = serde::Deserialize::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(n) => Ok(n.as_i64().map(|v| v as i32)),
        serde_json::Value::String(s) => Ok(s.trim().parse::<i32>().ok()),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentType {
    Accident,
    Congestion,
    Hazard,
    Police,
    RoadClosed,
    RoadHazard,
    DisabledVehicle,
    Jam,
    Weatherhazard,
    Construction,
    ObjectInRoadway,
    #[serde(other)]
    Unknown,
}

impl IncidentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::Accident => "ACCIDENT",
            IncidentType::Congestion => "CONGESTION",
            IncidentType::Hazard => "HAZARD",
            IncidentType::Police => "POLICE",
            IncidentType::RoadClosed => "ROAD_CLOSED",
            IncidentType::RoadHazard => "ROAD_HAZARD",
            IncidentType::DisabledVehicle => "DISABLED_VEHICLE",
            IncidentType::Jam => "JAM",
            IncidentType::Weatherhazard => "WEATHERHAZARD",
            IncidentType::Construction => "CONSTRUCTION",
            IncidentType::ObjectInRoadway => "OBJECT_IN_ROADWAY",
            IncidentType::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for IncidentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Active,
    Inactive,
    #[serde(other)]
    Unknown,
}

/// Remediation work item owned by the Ticket Store. The engine only ever
/// reads `incident_uuid` and `status`; the rest rides along for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: i64,
    pub incident_uuid: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: TicketStatus,
    #[serde(default, deserialize_with = "deserialize_lenient_int")]
    pub priority: Option<i32>,
    pub source: Option<String>,
    pub incident_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    InProgress,
    Done,
}

impl TicketStatus {
    /// OPEN and IN_PROGRESS tickets keep their incident alive; DONE is terminal.
    pub fn is_open(&self) -> bool {
        matches!(self, TicketStatus::Open | TicketStatus::InProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incident_from_feed_json() {
        let json = r#"{
            "id": 17,
            "uuid": "c0ffee-1",
            "type": "ACCIDENT",
            "subtype": null,
            "city": "Lima",
            "street": "Av. Javier Prado",
            "category": "accident",
            "priority": 3,
            "status": "active",
            "pub_time": "2024-05-01T12:00:00Z",
            "reliability": "8",
            "confidence": null,
            "lat": -12.097,
            "lon": -77.034
        }"#;

        let incident: Incident = serde_json::from_str(json).unwrap();
        assert_eq!(incident.id, 17);
        assert_eq!(incident.kind, IncidentType::Accident);
        assert_eq!(incident.status, IncidentStatus::Active);
        assert_eq!(incident.priority, Some(3));
        // Numeric string tolerated
        assert_eq!(incident.reliability, Some(8));
        assert_eq!(incident.confidence, None);
        // Engine annotations default off
        assert!(!incident.has_open_ticket);
        assert_eq!(incident.ticket_count, 0);
        assert!(incident.closed_at.is_none());
    }

    #[test]
    fn test_unknown_incident_type_tolerated() {
        let json = r#"{
            "id": 1,
            "uuid": "u",
            "type": "SOMETHING_NEW",
            "subtype": null,
            "city": null,
            "street": null,
            "category": null,
            "priority": "not-a-number",
            "status": "weird",
            "pub_time": "2024-05-01T12:00:00Z",
            "reliability": null,
            "confidence": null,
            "lat": 0.0,
            "lon": 0.0
        }"#;

        let incident: Incident = serde_json::from_str(json).unwrap();
        assert_eq!(incident.kind, IncidentType::Unknown);
        assert_eq!(incident.status, IncidentStatus::Unknown);
        assert_eq!(incident.priority, None);
    }

    #[test]
    fn test_ticket_from_store_json() {
        let json = r#"{
            "id": 5,
            "incidentUuid": "c0ffee-1",
            "title": "Despejar accidente",
            "description": null,
            "status": "IN_PROGRESS",
            "priority": 2,
            "source": "console",
            "incidentType": "ACCIDENT",
            "createdAt": "2024-05-01T12:05:00Z",
            "updatedAt": "2024-05-01T12:10:00Z",
            "createdBy": "operator1",
            "assignedTo": null
        }"#;

        let ticket: Ticket = serde_json::from_str(json).unwrap();
        assert_eq!(ticket.incident_uuid.as_deref(), Some("c0ffee-1"));
        assert!(ticket.status.is_open());
        assert!(!TicketStatus::Done.is_open());
    }
}
