/*!
# SoC DevKit - Bus simulé et utilitaires de test

Bibliothèque facilitant les tests de l'agrégateur sans broker:
- Bus MQTT simulé implémentant `BusPublisher`
- Unités simulées qui répondent aux requêtes `status`
- Builders de messages reply / result
- Harness pour piloter les boucles avec des intervalles courts
*/

pub mod message_builders;
pub mod mqtt_stub;
pub mod test_utils;

pub use message_builders::ReplyBuilder;
pub use mqtt_stub::{MockMessage, MockMqttClient};
pub use test_utils::TestHarness;
