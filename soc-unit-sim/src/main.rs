/*!
SoC Unit Simulator - Flotte simulée pour exercer l'agrégateur

Une seule connexion MQTT tient lieu de toutes les unités :
- abonnement au topic de requête de chaque unité répondante, réponse aux `status`
- abonnement au topic result, chaque agrégat publié est loggé
*/

mod fleet;

use anyhow::{Context, Result};
use clap::Parser;
use fleet::{plan_fleet, FleetPercentages};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, Outgoing, QoS};
use soc_aggregator::config::{config_path, load_config};
use soc_aggregator::UnitReply;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Flotte de test pour l'agrégateur SoC
#[derive(Debug, Parser)]
#[command(name = "soc-unit-sim", version, about)]
struct Args {
    /// Pourcentage d'unités actives
    #[arg(long, default_value_t = 100.0, value_parser = parse_percentage)]
    active: f64,

    /// Pourcentage d'unités hors bornes parmi les actives
    #[arg(long, default_value_t = 0.0, value_parser = parse_percentage)]
    oob: f64,

    /// Pourcentage d'unités inactives qui ne répondent pas du tout
    #[arg(long, default_value_t = 0.0, value_parser = parse_percentage)]
    nonresponding: f64,

    /// Fichier de config de l'agrégateur ($SOC_AGGREGATOR_CONFIG ou aggregator.yaml par défaut)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_percentage(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{s:?} is not a number: {e}"))?;
    if (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not within 0..=100"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let path = args.config.clone().unwrap_or_else(config_path);
    let cfg = load_config(&path)
        .await
        .with_context(|| format!("cannot read unit list from {}", path.display()))?;

    let pct = FleetPercentages {
        active: args.active,
        oob: args.oob,
        nonresponding: args.nonresponding,
    };
    let plan = plan_fleet(&cfg.units.unit_ids, cfg.units.bounds(), pct, &mut rand::thread_rng());

    for reply in &plan.responders {
        info!(
            "unit {}: active={} SoC={:.3} capacity={}kWh",
            reply.unit_id, reply.active, reply.soc, reply.total_capacity
        );
    }
    info!("Out of bound units: {}", plan.out_of_bounds.join(", "));
    info!("Non-responding units: {}", plan.silent.join(", "));

    // id d'unité -> corps de sa réponse
    let mut replies: HashMap<String, Vec<u8>> = HashMap::new();
    for reply in &plan.responders {
        let payload = encode_reply(reply).context("failed to encode unit reply")?;
        replies.insert(reply.unit_id.clone(), payload);
    }

    let mut opts = MqttOptions::new("soc-unit-sim", &cfg.mqtt.host, cfg.mqtt.port);
    opts.set_keep_alive(Duration::from_secs(cfg.mqtt.keep_alive_secs));
    opts.set_clean_session(true);
    let (client, mut eventloop) = AsyncClient::new(opts, replies.len() + 10);

    let mut subscriptions: Vec<String> =
        replies.keys().map(|id| cfg.topics.unit_topic(id)).collect();
    subscriptions.push(cfg.topics.result.clone());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let event = tokio::select! {
            _ = &mut ctrl_c => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                info!("connected, simulating {} responding units", replies.len());
                for topic in &subscriptions {
                    if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                        warn!("subscribe to {topic} failed: {e}");
                    }
                }
            }
            Ok(Event::Incoming(Incoming::Publish(p))) => {
                if p.topic == cfg.topics.result {
                    info!("Got results from aggregator: {}", String::from_utf8_lossy(&p.payload));
                } else if let Some(unit_id) = cfg.topics.unit_id_from_topic(&p.topic) {
                    let Some(reply) = replies.get(unit_id) else {
                        debug!("query for silent unit {unit_id}");
                        continue;
                    };
                    debug!("query for {unit_id}");
                    // try_publish : on ne bloque jamais la boucle qui fait avancer l'event loop
                    let states = cfg.topics.states.as_str();
                    if let Err(e) =
                        client.try_publish(states, QoS::AtLeastOnce, false, reply.clone())
                    {
                        warn!("reply from {unit_id} failed: {e}");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("MQTT connection error: {e}. Reconnecting...");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }

    info!("stopping simulated units");
    if let Err(e) = client.try_disconnect() {
        warn!("disconnect failed: {e}");
        return Ok(());
    }
    // laisser l'event loop émettre le Disconnect
    let flush = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };
    if tokio::time::timeout(Duration::from_secs(1), flush).await.is_err() {
        debug!("disconnect not flushed before timeout");
    }
    Ok(())
}

fn encode_reply(reply: &UnitReply) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(reply)
}
