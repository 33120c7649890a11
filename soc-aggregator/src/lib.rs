/*!
# SoC Aggregator - Scatter-gather de l'état de charge d'une flotte

Moteur central de l'agrégateur :
- `store` : état partagé unit_id -> dernière télémétrie
- `scatterer` : envoi périodique des requêtes `status` à chaque unité
- `gatherer` : fusion des réponses reçues sur le topic states
- `analyzer` : réconciliation, agrégat et publication sur le topic result
- `bus` : transport MQTT (rumqttc) et trait de publication
*/

pub mod analyzer;
pub mod bus;
pub mod config;
pub mod error;
pub mod gatherer;
pub mod model;
pub mod scatterer;
pub mod store;

pub use analyzer::{aggregate, AnalysisPolicy, AnalyzerPoster, SocBounds};
pub use bus::{BusMessage, BusPublisher, MqttBus};
pub use config::AggregatorConfig;
pub use error::{BusError, ConfigError, ReplyError};
pub use gatherer::Gatherer;
pub use model::{AggregateResult, Snapshot, UnitReading, UnitRecord, UnitReply, QUERY_TOKEN};
pub use scatterer::Scatterer;
pub use store::UnitStore;
