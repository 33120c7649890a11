use std::path::PathBuf;
use thiserror::Error;

/// Erreurs de transport sur le bus (publish / subscribe)
#[derive(Debug, Error)]
pub enum BusError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("bus unavailable, publish to {0} rejected")]
    Unavailable(String),
}

/// Réponse d'unité impossible à décoder
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("invalid reply JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Erreurs fatales au démarrage : fichier absent, YAML invalide, valeurs hors domaine
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("unit id list is empty")]
    NoUnits,
    #[error("invalid unit id {0:?}: must be non-empty and free of '+', '#' and '/'")]
    InvalidUnitId(String),
    #[error("unit id {0:?} is listed more than once")]
    DuplicateUnitId(String),
    #[error("{field} must be a finite number > 0, got {value}")]
    InvalidDuration { field: &'static str, value: f64 },
    #[error("{field} must be a finite number, got {value}")]
    InvalidSoc { field: &'static str, value: f64 },
    #[error("minimum_soc ({minimum}) is greater than maximum_soc ({maximum})")]
    InvertedSocBounds { minimum: f64, maximum: f64 },
    #[error("invalid MQTT settings: {0}")]
    InvalidMqtt(String),
}
