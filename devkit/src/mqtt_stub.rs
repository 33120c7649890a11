/*!
Mock MQTT Client pour tester l'agrégateur sans broker

Enregistre tous les messages publiés, permet de simuler la réception et
joue le rôle du broker + des unités : une requête publiée sur le topic d'une
unité enregistrée déclenche sa réponse sur le channel entrant.
*/

use anyhow::Result;
use parking_lot::Mutex;
use soc_aggregator::{BusError, BusMessage, BusPublisher};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Réponse automatique d'une unité simulée
#[derive(Debug, Clone)]
struct Responder {
    reply_topic: String,
    payload: Vec<u8>,
}

/// Bus simulé qui remplace rumqttc::AsyncClient dans les tests
#[derive(Clone, Default)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    message_sender: Arc<Mutex<Option<mpsc::Sender<BusMessage>>>>,
    responders: Arc<Mutex<HashMap<String, Responder>>>,
    failing: Arc<AtomicBool>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration du channel entrant (ce que le Gatherer consomme)
    pub fn setup_receiver(&self, capacity: usize) -> mpsc::Receiver<BusMessage> {
        let (sender, receiver) = mpsc::channel(capacity);
        *self.message_sender.lock() = Some(sender);
        receiver
    }

    /// Ferme le channel entrant, comme un driver MQTT qui s'arrête
    pub fn close_receiver(&self) {
        self.message_sender.lock().take();
    }

    /// Simule la réception d'un message
    pub async fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = BusMessage {
            topic: topic.into(),
            payload: payload.into(),
        };
        let sender = self.message_sender.lock().clone();
        match sender {
            Some(sender) => {
                tracing::debug!("[MOCK] simulated incoming on {}", message.topic);
                sender
                    .send(message)
                    .await
                    .map_err(|e| anyhow::anyhow!("Send error: {}", e))?;
            }
            None => anyhow::bail!("no receiver configured, call setup_receiver first"),
        }
        Ok(())
    }

    /// Enregistre une réponse automatique : toute publication sur `request_topic`
    /// renvoie `payload` sur `reply_topic`
    pub fn respond_on<V: Into<Vec<u8>>>(&self, request_topic: &str, reply_topic: &str, payload: V) {
        self.responders.lock().insert(
            request_topic.to_string(),
            Responder {
                reply_topic: reply_topic.to_string(),
                payload: payload.into(),
            },
        );
    }

    /// Arrête de répondre sur ce topic (unité qui devient muette)
    pub fn stop_responding(&self, request_topic: &str) {
        self.responders.lock().remove(request_topic);
    }

    /// Toutes les publications échouent tant que `failing` est vrai
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().clone()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parse le dernier message d'un topic en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let messages = self.find_messages_by_topic(topic);
        if let Some(last_msg) = messages.last() {
            let parsed: T = serde_json::from_slice(&last_msg.payload)?;
            Ok(Some(parsed))
        } else {
            Ok(None)
        }
    }

    /// Reset tous les messages enregistrés
    pub fn clear(&self) {
        self.published_messages.lock().clear();
    }
}

impl BusPublisher for MockMqttClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable(topic.to_string()));
        }

        self.published_messages.lock().push(MockMessage {
            topic: topic.to_string(),
            payload,
        });
        tracing::debug!("[MOCK] published to {}", topic);

        // pas de verrou tenu à travers l'await
        let responder = self.responders.lock().get(topic).cloned();
        let sender = self.message_sender.lock().clone();
        if let (Some(responder), Some(sender)) = (responder, sender) {
            let reply = BusMessage {
                topic: responder.reply_topic,
                payload: responder.payload,
            };
            if sender.send(reply).await.is_err() {
                tracing::debug!("[MOCK] receiver dropped, reply to {} lost", topic);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    async fn test_mock_client_publish_records() {
        let client = MockMqttClient::new();

        client.publish("test/topic", b"test message".to_vec()).await.unwrap();

        let messages = client.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "test/topic");
        assert_eq!(messages[0].payload, b"test message");
    }

    #[tokio::test]
    async fn test_failing_publish() {
        let client = MockMqttClient::new();
        client.set_failing(true);
        assert!(matches!(
            client.publish("a/b", vec![1]).await,
            Err(BusError::Unavailable(t)) if t == "a/b"
        ));
        assert!(client.get_published_messages().is_empty());
    }

    #[tokio::test]
    async fn test_responder_routes_reply() {
        let client = MockMqttClient::new();
        let mut rx = client.setup_receiver(8);
        client.respond_on("soc/units/A", "soc/states", b"hello".to_vec());

        client.publish("soc/units/B", b"status".to_vec()).await.unwrap();
        client.publish("soc/units/A", b"status".to_vec()).await.unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.topic, "soc/states");
        assert_eq!(reply.payload, b"hello");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_json_message_parsing() {
        let client = MockMqttClient::new();
        let payload = serde_json::to_vec(&serde_json::json!({"NumberOfUnits": 3})).unwrap();
        client.publish("soc/result", payload).await.unwrap();

        let parsed: Option<Value> = client.get_last_json_message("soc/result").unwrap();
        assert_eq!(parsed.unwrap()["NumberOfUnits"], 3);
    }

    #[tokio::test]
    async fn test_simulate_incoming_without_receiver() {
        let client = MockMqttClient::new();
        assert!(client.simulate_incoming("soc/states", b"{}".to_vec()).await.is_err());
    }
}
