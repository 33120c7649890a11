use crate::bus::BusPublisher;
use crate::config::TopicsConf;
use crate::model::QUERY_TOKEN;
use crate::store::UnitStore;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Partie "scatter" : interroge périodiquement chaque unité configurée.
pub struct Scatterer<P> {
    unit_ids: Vec<String>,
    poll_interval: Duration,
    topics: TopicsConf,
    store: UnitStore,
    publisher: P,
}

impl<P: BusPublisher> Scatterer<P> {
    pub fn new(
        unit_ids: Vec<String>,
        poll_interval: Duration,
        topics: TopicsConf,
        store: UnitStore,
        publisher: P,
    ) -> Self {
        Self {
            unit_ids,
            poll_interval,
            topics,
            store,
            publisher,
        }
    }

    /// Un cycle de requêtes, dans l'ordre de la liste.
    ///
    /// Le record est réinitialisé avant le publish pour qu'une réponse trouve
    /// toujours son entrée. L'annulation n'est vérifiée qu'entre deux unités.
    /// Retourne le nombre de requêtes effectivement publiées.
    pub async fn dispatch_cycle(&self, cancel: &CancellationToken) -> usize {
        let mut sent = 0;
        for unit_id in &self.unit_ids {
            if cancel.is_cancelled() {
                debug!("dispatch interrupted before {unit_id}");
                break;
            }
            self.store.query_started(unit_id);
            let topic = self.topics.unit_topic(unit_id);
            match self.publisher.publish(&topic, QUERY_TOKEN.as_bytes().to_vec()).await {
                Ok(()) => sent += 1,
                // pas de retry : l'unité passera en timeout au prochain cycle d'analyse
                Err(e) => warn!("query to {unit_id} failed: {e}"),
            }
        }
        sent
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!("Polling for units every {:?}", self.poll_interval);
        info!("Units to be polled: {}", self.unit_ids.join(", "));

        // premier tick immédiat, comme un premier cycle au démarrage
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let sent = self.dispatch_cycle(&cancel).await;
                    debug!("dispatched {sent}/{} queries", self.unit_ids.len());
                }
            }
        }
        info!("Scatterer stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
