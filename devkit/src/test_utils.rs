/*!
Test Harness pour l'agrégateur

Facilite l'écriture de tests avec:
- Setup automatique du bus simulé et du store partagé
- Unités simulées (répondantes, muettes, invalides)
- Attente des résultats publiés par l'AnalyzerPoster
*/

use anyhow::Result;
use crate::message_builders::{parse_result, ReplyBuilder};
use crate::mqtt_stub::MockMqttClient;
use serde_json::Value;
use soc_aggregator::bus::INBOUND_CAPACITY;
use soc_aggregator::config::TopicsConf;
use soc_aggregator::{AggregateResult, BusMessage, UnitStore};
use std::time::Duration;
use tokio::sync::mpsc;

/// Harness de test complet : bus simulé + store + topics par défaut
pub struct TestHarness {
    pub bus: MockMqttClient,
    pub store: UnitStore,
    pub topics: TopicsConf,
    inbound: Option<mpsc::Receiver<BusMessage>>,
}

impl TestHarness {
    /// Crée un nouveau harness de test
    pub fn new() -> Self {
        init_test_tracing();

        let bus = MockMqttClient::new();
        let inbound = bus.setup_receiver(INBOUND_CAPACITY);
        Self {
            bus,
            store: UnitStore::new(),
            topics: TopicsConf::default(),
            inbound: Some(inbound),
        }
    }

    /// Récupère le channel entrant pour le donner au Gatherer (une seule fois)
    pub fn take_inbound(&mut self) -> mpsc::Receiver<BusMessage> {
        self.inbound.take().expect("inbound receiver already taken")
    }

    /// L'unité répondra `reply` à chaque requête reçue
    pub fn unit_responds(&self, reply: ReplyBuilder) {
        let unit_id = reply.clone().build().unit_id;
        self.bus.respond_on(
            &self.topics.unit_topic(&unit_id),
            &self.topics.states,
            reply.to_payload(),
        );
    }

    /// L'unité répond avec un corps non décodable
    pub fn unit_responds_garbage(&self, unit_id: &str, body: &[u8]) {
        self.bus
            .respond_on(&self.topics.unit_topic(unit_id), &self.topics.states, body.to_vec());
    }

    pub fn unit_goes_silent(&self, unit_id: &str) {
        self.bus.stop_responding(&self.topics.unit_topic(unit_id));
    }

    /// Simule une réponse spontanée sur le topic states
    pub async fn send_reply(&self, reply: ReplyBuilder) -> Result<()> {
        self.bus
            .simulate_incoming(self.topics.states.clone(), reply.to_payload())
            .await
    }

    /// Requêtes publiées vers une unité
    pub fn queries_sent_to(&self, unit_id: &str) -> usize {
        self.bus
            .find_messages_by_topic(&self.topics.unit_topic(unit_id))
            .len()
    }

    /// Tous les résultats publiés jusqu'ici
    pub fn results(&self) -> Result<Vec<AggregateResult>> {
        self.bus
            .find_messages_by_topic(&self.topics.result)
            .iter()
            .map(|msg| parse_result(&msg.payload).map_err(Into::into))
            .collect()
    }

    /// Attend un résultat qui satisfait `predicate`
    pub async fn wait_for_result<F>(
        &self,
        timeout_ms: u64,
        predicate: F,
    ) -> Result<Option<AggregateResult>>
    where
        F: Fn(&AggregateResult) -> bool,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if let Some(found) = self.results()?.into_iter().rev().find(|r| predicate(r)) {
                return Ok(Some(found));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tracing::warn!("timeout waiting for matching result on {}", self.topics.result);
        Ok(None)
    }

    /// Attend qu'un message quelconque soit publié sur un topic
    pub async fn wait_for_message(&self, topic: &str, timeout_ms: u64) -> Result<Option<Value>> {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if let Some(msg) = self.bus.get_last_json_message::<Value>(topic)? {
                return Ok(Some(msg));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tracing::warn!("timeout waiting for message on {}", topic);
        Ok(None)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Init logging pour tests ; sans effet si un subscriber est déjà installé
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
