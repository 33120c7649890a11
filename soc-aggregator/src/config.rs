use crate::analyzer::{AnalysisPolicy, SocBounds};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const CONFIG_ENV_VAR: &str = "SOC_AGGREGATOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "aggregator.yaml";
/// Plafond des intervalles et timeouts (un an)
pub const MAX_DURATION_SECS: f64 = 365.0 * 24.0 * 3600.0;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AggregatorConfig {
    #[serde(default)]
    pub mqtt: MqttConf,
    #[serde(default)]
    pub topics: TopicsConf,
    pub units: UnitsConf,
    pub results: ResultsConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TopicsConf {
    pub units_prefix: String, // requête adressée à l'unité : {units_prefix}/{unit_id}
    pub states: String,
    pub result: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UnitsConf {
    pub unit_ids: Vec<String>,
    pub poll_interval_secs: f64,
    pub minimum_soc: f64,
    pub maximum_soc: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResultsConf {
    pub results_interval_secs: f64,
    pub unit_timeout_secs: f64,
}

fn default_client_id() -> String {
    "soc-aggregator".into()
}

fn default_keep_alive() -> u64 {
    15
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

impl Default for TopicsConf {
    fn default() -> Self {
        Self {
            units_prefix: "soc/units".into(),
            states: "soc/states".into(),
            result: "soc/result".into(),
        }
    }
}

impl TopicsConf {
    pub fn unit_topic(&self, unit_id: &str) -> String {
        format!("{}/{}", self.units_prefix, unit_id)
    }

    /// Inverse de unit_topic : "soc/units/A" -> Some("A")
    pub fn unit_id_from_topic<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic
            .strip_prefix(self.units_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|id| !id.is_empty())
    }
}

impl UnitsConf {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn bounds(&self) -> SocBounds {
        SocBounds {
            minimum: self.minimum_soc,
            maximum: self.maximum_soc,
        }
    }
}

impl ResultsConf {
    pub fn results_interval(&self) -> Duration {
        Duration::from_secs_f64(self.results_interval_secs)
    }

    pub fn unit_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.unit_timeout_secs)
    }
}

impl AggregatorConfig {
    pub fn from_yaml_str(txt: &str) -> Result<Self, ConfigError> {
        let cfg: AggregatorConfig = serde_yaml::from_str(txt)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn analysis_policy(&self) -> AnalysisPolicy {
        AnalysisPolicy {
            unit_timeout: self.results.unit_timeout(),
            bounds: self.units.bounds(),
        }
    }

    /// Toute valeur manquante ou hors domaine est une erreur fatale de démarrage
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::InvalidMqtt("host is empty".into()));
        }
        if self.mqtt.client_id.trim().is_empty() {
            return Err(ConfigError::InvalidMqtt("client_id is empty".into()));
        }
        if self.mqtt.keep_alive_secs < 5 {
            return Err(ConfigError::InvalidMqtt(format!(
                "keep_alive_secs must be >= 5, got {}",
                self.mqtt.keep_alive_secs
            )));
        }

        if self.units.unit_ids.is_empty() {
            return Err(ConfigError::NoUnits);
        }
        let mut seen = HashSet::new();
        for id in &self.units.unit_ids {
            if id.is_empty() || id.contains(['+', '#', '/']) {
                return Err(ConfigError::InvalidUnitId(id.clone()));
            }
            if !seen.insert(id.as_str()) {
                return Err(ConfigError::DuplicateUnitId(id.clone()));
            }
        }

        check_duration("poll_interval_secs", self.units.poll_interval_secs)?;
        check_duration("results_interval_secs", self.results.results_interval_secs)?;
        check_duration("unit_timeout_secs", self.results.unit_timeout_secs)?;

        check_soc("minimum_soc", self.units.minimum_soc)?;
        check_soc("maximum_soc", self.units.maximum_soc)?;
        if self.units.minimum_soc > self.units.maximum_soc {
            return Err(ConfigError::InvertedSocBounds {
                minimum: self.units.minimum_soc,
                maximum: self.units.maximum_soc,
            });
        }
        Ok(())
    }
}

fn check_duration(field: &'static str, value: f64) -> Result<(), ConfigError> {
    // au-delà, Instant + intervalle déborde dans les boucles tokio
    if value.is_finite() && value > 0.0 && value <= MAX_DURATION_SECS {
        Ok(())
    } else {
        Err(ConfigError::InvalidDuration { field, value })
    }
}

fn check_soc(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidSoc { field, value })
    }
}

pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_ENV_VAR)
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into())
        .into()
}

pub async fn load_config(path: &Path) -> Result<AggregatorConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    AggregatorConfig::from_yaml_str(&txt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"
mqtt:
  host: broker.local
  port: 1884
topics:
  units_prefix: fleet/units
  states: fleet/states
  result: fleet/result
units:
  unit_ids: ["A", "B", "C"]
  poll_interval_secs: 10
  minimum_soc: 0.2
  maximum_soc: 0.9
results:
  results_interval_secs: 5.0
  unit_timeout_secs: 5.0
"#;

    #[test]
    fn test_parse_valid_config() {
        let cfg = AggregatorConfig::from_yaml_str(VALID).unwrap();
        assert_eq!(cfg.mqtt.host, "broker.local");
        assert_eq!(cfg.mqtt.port, 1884);
        assert_eq!(cfg.mqtt.client_id, "soc-aggregator");
        assert_eq!(cfg.units.unit_ids, vec!["A", "B", "C"]);
        assert_eq!(cfg.units.poll_interval(), Duration::from_secs(10));
        assert_eq!(cfg.analysis_policy().unit_timeout, Duration::from_secs(5));
        assert_eq!(cfg.topics.unit_topic("B"), "fleet/units/B");
    }

    #[test]
    fn test_defaults_for_mqtt_and_topics() {
        let txt = r#"
units: { unit_ids: ["A"], poll_interval_secs: 1, minimum_soc: 0.1, maximum_soc: 0.9 }
results: { results_interval_secs: 1, unit_timeout_secs: 2 }
"#;
        let cfg = AggregatorConfig::from_yaml_str(txt).unwrap();
        assert_eq!(cfg.mqtt.host, "localhost");
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.topics.states, "soc/states");
        assert_eq!(cfg.topics.result, "soc/result");
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        let txt = r#"
units: { unit_ids: ["A"], poll_interval_secs: 1, minimum_soc: 0.1, maximum_soc: 0.9 }
"#;
        assert!(matches!(
            AggregatorConfig::from_yaml_str(txt),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unparsable_value_is_parse_error() {
        let txt = VALID.replace("poll_interval_secs: 10", "poll_interval_secs: soon");
        assert!(matches!(
            AggregatorConfig::from_yaml_str(&txt),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validation_failures() {
        let inverted = VALID.replace("minimum_soc: 0.2", "minimum_soc: 0.95");
        assert!(matches!(
            AggregatorConfig::from_yaml_str(&inverted),
            Err(ConfigError::InvertedSocBounds { .. })
        ));

        let wildcard = VALID.replace(r#"["A", "B", "C"]"#, r#"["A", "B/1"]"#);
        assert!(matches!(
            AggregatorConfig::from_yaml_str(&wildcard),
            Err(ConfigError::InvalidUnitId(id)) if id == "B/1"
        ));

        let duplicate = VALID.replace(r#"["A", "B", "C"]"#, r#"["A", "A"]"#);
        assert!(matches!(
            AggregatorConfig::from_yaml_str(&duplicate),
            Err(ConfigError::DuplicateUnitId(_))
        ));

        let empty = VALID.replace(r#"["A", "B", "C"]"#, "[]");
        assert!(matches!(
            AggregatorConfig::from_yaml_str(&empty),
            Err(ConfigError::NoUnits)
        ));

        let zero = VALID.replace("unit_timeout_secs: 5.0", "unit_timeout_secs: 0");
        assert!(matches!(
            AggregatorConfig::from_yaml_str(&zero),
            Err(ConfigError::InvalidDuration { field: "unit_timeout_secs", .. })
        ));
    }

    #[test]
    fn test_huge_durations_are_rejected() {
        let huge = VALID.replace("results_interval_secs: 5.0", "results_interval_secs: 1.0e19");
        assert!(matches!(
            AggregatorConfig::from_yaml_str(&huge),
            Err(ConfigError::InvalidDuration { field: "results_interval_secs", .. })
        ));

        let over_a_year = VALID.replace("poll_interval_secs: 10", "poll_interval_secs: 31536001");
        assert!(matches!(
            AggregatorConfig::from_yaml_str(&over_a_year),
            Err(ConfigError::InvalidDuration { field: "poll_interval_secs", .. })
        ));

        let one_year = VALID.replace("unit_timeout_secs: 5.0", "unit_timeout_secs: 31536000");
        let cfg = AggregatorConfig::from_yaml_str(&one_year).unwrap();
        assert_eq!(cfg.results.unit_timeout(), Duration::from_secs(31_536_000));
    }

    #[tokio::test]
    async fn test_longest_valid_interval_keeps_analyzer_running() {
        use crate::{AnalyzerPoster, BusError, BusPublisher, UnitStore};
        use tokio_util::sync::CancellationToken;

        #[derive(Clone)]
        struct Discard;
        impl BusPublisher for Discard {
            async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), BusError> {
                Ok(())
            }
        }

        let txt = VALID.replace("results_interval_secs: 5.0", "results_interval_secs: 31536000");
        let cfg = AggregatorConfig::from_yaml_str(&txt).unwrap();
        let cancel = CancellationToken::new();
        let analyzer = AnalyzerPoster::new(
            UnitStore::new(),
            Discard,
            cfg.topics.result.clone(),
            cfg.results.results_interval(),
            cfg.analysis_policy(),
        )
        .spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!analyzer.is_finished());
        cancel.cancel();
        analyzer.await.unwrap();
    }

    #[test]
    fn test_unit_id_from_topic() {
        let topics = TopicsConf::default();
        assert_eq!(topics.unit_id_from_topic("soc/units/A"), Some("A"));
        assert_eq!(topics.unit_id_from_topic("soc/units/"), None);
        assert_eq!(topics.unit_id_from_topic("soc/unitsA"), None);
        assert_eq!(topics.unit_id_from_topic("soc/states"), None);
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();

        let cfg = load_config(file.path()).await.unwrap();
        assert_eq!(cfg.units.unit_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(matches!(
            load_config(&path).await,
            Err(ConfigError::NotFound(p)) if p == path
        ));
    }
}
