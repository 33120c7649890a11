use crate::bus::BusMessage;
use crate::error::ReplyError;
use crate::model::UnitReply;
use crate::store::UnitStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Partie "gather" : fusionne les réponses des unités dans le store.
/// L'analyse des résultats est faite par l'AnalyzerPoster.
pub struct Gatherer {
    store: UnitStore,
    states_topic: String,
}

impl Gatherer {
    pub fn new(store: UnitStore, states_topic: impl Into<String>) -> Self {
        Self {
            store,
            states_topic: states_topic.into(),
        }
    }

    /// Décode puis fusionne une réponse.
    ///
    /// `Ok(false)` : unité jamais interrogée, ignorée sans erreur.
    pub fn handle_payload(&self, payload: &[u8]) -> Result<bool, ReplyError> {
        let reply = UnitReply::from_slice(payload)?;
        let merged = self.store.put_data(&reply);
        if merged {
            debug!("reply from {}: SoC={} active={}", reply.unit_id, reply.soc, reply.active);
        } else {
            debug!("reply from unknown unit {}, ignored", reply.unit_id);
        }
        Ok(merged)
    }

    /// Consomme le channel jusqu'à annulation ou fermeture.
    /// Un message reçu est toujours traité en entier avant de revérifier l'annulation.
    pub async fn run(self, mut inbound: mpsc::Receiver<BusMessage>, cancel: CancellationToken) {
        info!("Gatherer listening on {}", self.states_topic);
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(m) => m,
                    None => {
                        debug!("inbound channel closed");
                        break;
                    }
                },
            };

            if message.topic != self.states_topic {
                debug!("ignoring message on {}", message.topic);
                continue;
            }
            if let Err(e) = self.handle_payload(&message.payload) {
                warn!("Invalid data. Skipping. Error: {e}");
            }
        }
        info!("Gatherer stopped");
    }

    pub fn spawn(
        self,
        inbound: mpsc::Receiver<BusMessage>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(inbound, cancel))
    }
}
