use crate::model::{Snapshot, UnitReading, UnitRecord, UnitReply};
use parking_lot::Mutex;
use std::sync::Arc;
use time::OffsetDateTime;

type Shared<T> = Arc<Mutex<T>>;

/// Store partagé unit_id -> dernière télémétrie.
///
/// Seul point de synchronisation entre Scatterer, Gatherer et AnalyzerPoster.
/// Chaque opération est une section critique unique, sans I/O sous le verrou.
#[derive(Clone, Default)]
pub struct UnitStore {
    units: Shared<Snapshot>,
}

impl UnitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remplace l'entrée de l'unité par un record vierge horodaté maintenant
    pub fn query_started(&self, unit_id: &str) {
        self.query_started_at(unit_id, OffsetDateTime::now_utc());
    }

    pub fn query_started_at(&self, unit_id: &str, at: OffsetDateTime) {
        self.units
            .lock()
            .insert(unit_id.to_string(), UnitRecord::queried(unit_id, at));
    }

    /// Fusionne une réponse si l'unité a déjà été interrogée.
    /// Retourne false (sans rien créer) pour une unité inconnue.
    pub fn put_data(&self, reply: &UnitReply) -> bool {
        self.put_data_at(reply, OffsetDateTime::now_utc())
    }

    pub fn put_data_at(&self, reply: &UnitReply, at: OffsetDateTime) -> bool {
        let mut units = self.units.lock();
        match units.get_mut(&reply.unit_id) {
            Some(record) => {
                record.reading = Some(UnitReading {
                    received_time: at,
                    active: reply.active,
                    soc: reply.soc,
                    total_capacity: reply.total_capacity,
                });
                true
            }
            None => false,
        }
    }

    /// Copie profonde prise sous le verrou
    pub fn snapshot(&self) -> Snapshot {
        self.units.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.units.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.lock().is_empty()
    }
}
