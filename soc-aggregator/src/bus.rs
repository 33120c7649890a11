/**
 * BUS MQTT - Transport publish/subscribe partagé par les trois boucles
 *
 * RÔLE : Une seule connexion rumqttc ; une task "driver" poll l'event loop,
 * (ré)abonne les topics à chaque ConnAck et pousse les publish entrants
 * dans un channel tokio consommé par le Gatherer.
 *
 * Les boucles ne voient que le trait BusPublisher, ce qui permet de les
 * tester contre le bus simulé du devkit.
 */

use crate::config::MqttConf;
use crate::error::BusError;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Taille du channel entre le driver MQTT et le Gatherer
pub const INBOUND_CAPACITY: usize = 256;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Message reçu sur un topic abonné
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Côté publication du bus. Pas de retry : un échec est remonté à l'appelant.
pub trait BusPublisher: Clone + Send + Sync + 'static {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), BusError>> + Send;
}

impl BusPublisher for AsyncClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        AsyncClient::publish(self, topic, QoS::AtLeastOnce, false, payload).await?;
        Ok(())
    }
}

pub struct MqttBus {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttBus {
    /// Prépare client + event loop ; la connexion réelle se fait au premier poll du driver
    pub fn new(cfg: &MqttConf, request_capacity: usize) -> Self {
        let mut opts = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
        opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));
        opts.set_clean_session(true);
        let (client, eventloop) = AsyncClient::new(opts, request_capacity);
        info!("MQTT client {} targeting {}:{}", cfg.client_id, cfg.host, cfg.port);
        Self { client, eventloop }
    }

    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Lance la task qui fait vivre la connexion.
    ///
    /// S'arrête sur `stop`, ou après avoir émis le Disconnect demandé par
    /// `client.disconnect()`.
    pub fn spawn_driver(
        self,
        subscriptions: Vec<String>,
        inbound: mpsc::Sender<BusMessage>,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let MqttBus { client, mut eventloop } = self;

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = stop.cancelled() => break,
                    event = eventloop.poll() => event,
                };

                match event {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("MQTT connected, subscribing to {} topic(s)", subscriptions.len());
                        // clean session : les abonnements sont perdus à chaque reconnexion
                        for topic in &subscriptions {
                            if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                                warn!("subscribe to {topic} failed: {e}");
                            }
                        }
                    }
                    Ok(Event::Incoming(Incoming::Publish(p))) => {
                        let message = BusMessage {
                            topic: p.topic.clone(),
                            payload: p.payload.to_vec(),
                        };
                        if inbound.send(message).await.is_err() {
                            debug!("inbound receiver dropped, discarding message on {}", p.topic);
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        info!("MQTT disconnect sent");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT error: {e:?}, retrying in {}s", RECONNECT_BACKOFF.as_secs());
                        tokio::select! {
                            _ = stop.cancelled() => break,
                            _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                        }
                    }
                }
            }
            info!("MQTT driver stopped");
        })
    }
}
