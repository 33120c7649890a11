/**
 * ANALYZER POSTER - Analyse périodique du store et publication du résumé de flotte
 *
 * RÔLE : À chaque intervalle, snapshot du store, réconciliation actif/inactif
 * par unité (timeout + pont avec le snapshot précédent), calcul de l'agrégat
 * puis publication JSON sur le topic result.
 *
 * Le snapshot brut (avant réconciliation) est conservé pour le cycle suivant :
 * une unité réinterrogée mais pas encore revenue reprend sa lecture précédente
 * tant que son timeout n'est pas dépassé.
 */

use crate::bus::BusPublisher;
use crate::model::{AggregateResult, Snapshot, UnitReading, UnitRecord};
use crate::store::UnitStore;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bornes inclusives de SoC ; une valeur égale à une borne est dans les bornes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SocBounds {
    pub minimum: f64,
    pub maximum: f64,
}

impl SocBounds {
    pub fn contains(&self, soc: f64) -> bool {
        !(soc < self.minimum || soc > self.maximum)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisPolicy {
    pub unit_timeout: Duration,
    pub bounds: SocBounds,
}

/// Lecture retenue pour l'unité ce cycle, None si l'unité est dérivée inactive
fn effective_reading<'a>(
    record: &'a UnitRecord,
    previous: &'a Snapshot,
    now: OffsetDateTime,
    unit_timeout: Duration,
) -> Option<&'a UnitReading> {
    if let Some(reading) = &record.reading {
        return Some(reading);
    }
    if now - record.query_time > unit_timeout {
        return None;
    }
    previous
        .get(&record.unit_id)
        .and_then(|prev| prev.reading.as_ref())
}

/// Calcule l'agrégat d'un cycle à partir du snapshot courant et du précédent
pub fn aggregate(
    current: &Snapshot,
    previous: &Snapshot,
    now: OffsetDateTime,
    policy: &AnalysisPolicy,
) -> AggregateResult {
    let mut active_count = 0usize;
    let mut soc_sum = 0.0;
    let mut remaining_capacity = 0.0;
    let mut out_of_boundaries = Vec::new();

    for (unit_id, record) in current {
        let reading = match effective_reading(record, previous, now, policy.unit_timeout) {
            Some(r) if r.active => r,
            _ => continue,
        };

        if !policy.bounds.contains(reading.soc) {
            out_of_boundaries.push(unit_id.clone());
        }
        remaining_capacity += reading.soc * reading.total_capacity;
        soc_sum += reading.soc;
        active_count += 1;
    }

    let average_soc = if active_count > 0 {
        soc_sum / active_count as f64
    } else {
        0.0
    };

    AggregateResult {
        average_soc,
        remaining_capacity,
        number_of_active_units: active_count,
        number_of_units: current.len(),
        units_out_of_boundaries: out_of_boundaries,
    }
}

pub struct AnalyzerPoster<P> {
    store: UnitStore,
    publisher: P,
    result_topic: String,
    results_interval: Duration,
    policy: AnalysisPolicy,
    previous: Snapshot,
}

impl<P: BusPublisher> AnalyzerPoster<P> {
    pub fn new(
        store: UnitStore,
        publisher: P,
        result_topic: impl Into<String>,
        results_interval: Duration,
        policy: AnalysisPolicy,
    ) -> Self {
        Self {
            store,
            publisher,
            result_topic: result_topic.into(),
            results_interval,
            policy,
            previous: Snapshot::new(),
        }
    }

    /// Snapshot + agrégat ; le snapshot brut devient la référence du cycle suivant
    pub fn analyze_at(&mut self, now: OffsetDateTime) -> AggregateResult {
        let current = self.store.snapshot();
        let result = aggregate(&current, &self.previous, now, &self.policy);
        self.previous = current;
        result
    }

    /// Un cycle complet : analyse puis publication (sans retry)
    pub async fn run_cycle(&mut self) -> AggregateResult {
        let result = self.analyze_at(OffsetDateTime::now_utc());
        match serde_json::to_vec(&result) {
            Ok(payload) => {
                if let Err(e) = self.publisher.publish(&self.result_topic, payload).await {
                    warn!("failed to publish result: {e}");
                } else {
                    debug!(
                        "published result: {}/{} active, average SoC {:.3}",
                        result.number_of_active_units, result.number_of_units, result.average_soc
                    );
                }
            }
            Err(e) => warn!("failed to serialize result: {e}"),
        }
        result
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "Analyzer posting to {} every {:?} (unit timeout {:?}, SoC bounds [{}, {}])",
            self.result_topic,
            self.results_interval,
            self.policy.unit_timeout,
            self.policy.bounds.minimum,
            self.policy.bounds.maximum
        );

        // première analyse après un intervalle complet
        let start = Instant::now() + self.results_interval;
        let mut interval = tokio::time::interval_at(start, self.results_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
            }
        }
        info!("Analyzer/poster stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
