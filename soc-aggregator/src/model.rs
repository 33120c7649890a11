use crate::error::ReplyError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Jeton littéral envoyé à chaque unité pour lui demander son état
pub const QUERY_TOKEN: &str = "status";

/// Dernière télémétrie connue d'une unité pour le cycle de requête en cours
#[derive(Debug, Clone, PartialEq)]
pub struct UnitRecord {
    pub unit_id: String,
    pub query_time: OffsetDateTime,
    /// None tant qu'aucune réponse n'a été fusionnée depuis le dernier query_started
    pub reading: Option<UnitReading>,
}

/// Valeurs rapportées par l'unité, horodatées à la réception
#[derive(Debug, Clone, PartialEq)]
pub struct UnitReading {
    pub received_time: OffsetDateTime,
    pub active: bool,
    pub soc: f64,
    pub total_capacity: f64,
}

impl UnitRecord {
    pub fn queried(unit_id: impl Into<String>, query_time: OffsetDateTime) -> Self {
        Self {
            unit_id: unit_id.into(),
            query_time,
            reading: None,
        }
    }

    pub fn received_time(&self) -> Option<OffsetDateTime> {
        self.reading.as_ref().map(|r| r.received_time)
    }
}

/// Copie indépendante du store, triée par unit id
pub type Snapshot = BTreeMap<String, UnitRecord>;

/// Message entrant sur le topic states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReply {
    #[serde(rename = "UnitId")]
    pub unit_id: String,
    #[serde(rename = "Active")]
    pub active: bool,
    #[serde(rename = "SoC")]
    pub soc: f64,
    #[serde(rename = "TotalCapacity")]
    pub total_capacity: f64,
}

impl UnitReply {
    pub fn from_slice(payload: &[u8]) -> Result<Self, ReplyError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Résumé de flotte publié sur le topic result à chaque cycle d'analyse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    #[serde(rename = "AverageSoC")]
    pub average_soc: f64,
    #[serde(rename = "RemainingCapacity")]
    pub remaining_capacity: f64,
    #[serde(rename = "NumberOfActiveUnits")]
    pub number_of_active_units: usize,
    #[serde(rename = "NumberOfUnits")]
    pub number_of_units: usize,
    #[serde(rename = "UnitsOutOfBoundaries")]
    pub units_out_of_boundaries: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_field_names() {
        let payload = br#"{"UnitId":"A","Active":true,"SoC":0.5,"TotalCapacity":1000}"#;
        let reply = UnitReply::from_slice(payload).unwrap();
        assert_eq!(reply.unit_id, "A");
        assert!(reply.active);
        assert_eq!(reply.soc, 0.5);
        assert_eq!(reply.total_capacity, 1000.0);
    }

    #[test]
    fn test_reply_missing_field_rejected() {
        let payload = br#"{"UnitId":"A","Active":true,"SoC":0.5}"#;
        assert!(matches!(UnitReply::from_slice(payload), Err(ReplyError::Decode(_))));
        assert!(UnitReply::from_slice(b"status").is_err());
    }

    #[test]
    fn test_result_field_names() {
        let result = AggregateResult {
            average_soc: 0.3,
            remaining_capacity: 700.0,
            number_of_active_units: 2,
            number_of_units: 3,
            units_out_of_boundaries: vec!["B".into()],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["AverageSoC"], 0.3);
        assert_eq!(json["RemainingCapacity"], 700.0);
        assert_eq!(json["NumberOfActiveUnits"], 2);
        assert_eq!(json["NumberOfUnits"], 3);
        assert_eq!(json["UnitsOutOfBoundaries"][0], "B");
    }
}
