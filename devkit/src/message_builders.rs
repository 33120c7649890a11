/*!
Helpers pour construire les messages échangés sur le bus

Format identique à celui des unités réelles : reply `{UnitId, Active, SoC, TotalCapacity}`.
*/

use serde_json::Value;
use soc_aggregator::{AggregateResult, UnitReply};

/// Builder de réponses d'unité
#[derive(Debug, Clone)]
pub struct ReplyBuilder {
    reply: UnitReply,
}

impl ReplyBuilder {
    pub fn new<S: Into<String>>(unit_id: S) -> Self {
        Self {
            reply: UnitReply {
                unit_id: unit_id.into(),
                active: true,
                soc: 0.5,
                total_capacity: 1000.0,
            },
        }
    }

    pub fn active(mut self, active: bool) -> Self {
        self.reply.active = active;
        self
    }

    pub fn soc(mut self, soc: f64) -> Self {
        self.reply.soc = soc;
        self
    }

    pub fn total_capacity(mut self, total_capacity: f64) -> Self {
        self.reply.total_capacity = total_capacity;
        self
    }

    pub fn build(self) -> UnitReply {
        self.reply
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "UnitId": self.reply.unit_id,
            "Active": self.reply.active,
            "SoC": self.reply.soc,
            "TotalCapacity": self.reply.total_capacity,
        })
    }

    pub fn to_payload(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }
}

/// Parse un message result publié par l'AnalyzerPoster
pub fn parse_result(payload: &[u8]) -> serde_json::Result<AggregateResult> {
    serde_json::from_slice(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_builder_round_trips_through_decoder() {
        let builder = ReplyBuilder::new("unit-7").soc(0.42).total_capacity(3000.0).active(false);
        let decoded = UnitReply::from_slice(&builder.to_payload()).unwrap();
        assert_eq!(decoded, builder.build());
    }

    #[test]
    fn test_reply_json_field_names() {
        let json = ReplyBuilder::new("A").to_json();
        assert_eq!(json["UnitId"], "A");
        assert_eq!(json["Active"], true);
        assert_eq!(json["SoC"], 0.5);
        assert_eq!(json["TotalCapacity"], 1000.0);
    }

    #[test]
    fn test_parse_result_reads_published_field_names() {
        let payload = serde_json::json!({
            "AverageSoC": 0.3,
            "RemainingCapacity": 700.0,
            "NumberOfActiveUnits": 2,
            "NumberOfUnits": 3,
            "UnitsOutOfBoundaries": ["B"],
        });
        let result = parse_result(payload.to_string().as_bytes()).unwrap();
        assert_eq!(result.number_of_units, 3);
        assert_eq!(result.number_of_active_units, 2);
        assert_eq!(result.units_out_of_boundaries, vec!["B".to_string()]);
        assert!(parse_result(b"{}").is_err());
    }
}
