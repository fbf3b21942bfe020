use crate::types::IncidentType;
use serde::Serialize;

/// Display attributes for one incident type: marker color, emoji, Spanish
/// name. Unknown types get a neutral gray pin.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TypeLabel {
    pub color: &'static str,
    pub emoji: &'static str,
    pub name_es: &'static str,
}

pub fn label(kind: IncidentType) -> TypeLabel {
    match kind {
        IncidentType::Accident => TypeLabel {
            color: "#dc3545",
            emoji: "🚗",
            name_es: "Accidente",
        },
        IncidentType::Congestion => TypeLabel {
            color: "#ff9800",
            emoji: "🚦",
            name_es: "Congestión",
        },
        IncidentType::Hazard => TypeLabel {
            color: "#e91e63",
            emoji: "⚠️",
            name_es: "Peligro",
        },
        IncidentType::Police => TypeLabel {
            color: "#0056b3",
            emoji: "🚓",
            name_es: "Policía",
        },
        IncidentType::RoadClosed => TypeLabel {
            color: "#6f42c1",
            emoji: "🚧",
            name_es: "Vía Cerrada",
        },
        IncidentType::RoadHazard => TypeLabel {
            color: "#fd7e14",
            emoji: "⛔",
            name_es: "Peligro en la Vía",
        },
        IncidentType::DisabledVehicle => TypeLabel {
            color: "#17a2b8",
            emoji: "🚙",
            name_es: "Vehículo Descompuesto",
        },
        IncidentType::Jam => TypeLabel {
            color: "#ffc107",
            emoji: "🚥",
            name_es: "Embotellamiento",
        },
        IncidentType::Weatherhazard => TypeLabel {
            color: "#6c757d",
            emoji: "🌧️",
            name_es: "Peligro Climático",
        },
        IncidentType::Construction => TypeLabel {
            color: "#795548",
            emoji: "🏗️",
            name_es: "Construcción",
        },
        IncidentType::ObjectInRoadway => TypeLabel {
            color: "#b71c1c",
            emoji: "📦",
            name_es: "Objeto en la Vía",
        },
        IncidentType::Unknown => TypeLabel {
            color: "#999999",
            emoji: "📍",
            name_es: "Desconocido",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_gets_fallback_pin() {
        let fallback = label(IncidentType::Unknown);
        assert_eq!(fallback.color, "#999999");
        assert_eq!(fallback.emoji, "📍");
    }
}
