/**
 * SOC AGGREGATOR - Point d'entrée de l'agrégateur
 *
 * RÔLE : Charge la config, ouvre la connexion MQTT et lance les trois boucles
 * (Scatterer, Gatherer, AnalyzerPoster) autour du store partagé.
 * Ctrl-C annule les boucles puis ferme proprement la connexion.
 */

use anyhow::{Context, Result};
use soc_aggregator::bus::INBOUND_CAPACITY;
use soc_aggregator::config::{config_path, load_config};
use soc_aggregator::{AnalyzerPoster, Gatherer, MqttBus, Scatterer, UnitStore};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = config_path();
    let cfg = load_config(&path)
        .await
        .with_context(|| format!("cannot start with config {}", path.display()))?;
    info!("loaded config from {} ({} units)", path.display(), cfg.units.unit_ids.len());

    let store = UnitStore::new();

    // une connexion partagée ; le driver doit tourner pour que les publish sortent
    let bus = MqttBus::new(&cfg.mqtt, cfg.units.unit_ids.len().max(10));
    let client = bus.client();
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
    let driver_stop = CancellationToken::new();
    let mut driver =
        bus.spawn_driver(vec![cfg.topics.states.clone()], inbound_tx, driver_stop.clone());

    let shutdown = CancellationToken::new();

    let scatterer = Scatterer::new(
        cfg.units.unit_ids.clone(),
        cfg.units.poll_interval(),
        cfg.topics.clone(),
        store.clone(),
        client.clone(),
    )
    .spawn(shutdown.child_token());

    let gatherer = Gatherer::new(store.clone(), cfg.topics.states.clone())
        .spawn(inbound_rx, shutdown.child_token());

    let analyzer = AnalyzerPoster::new(
        store.clone(),
        client.clone(),
        cfg.topics.result.clone(),
        cfg.results.results_interval(),
        cfg.analysis_policy(),
    )
    .spawn(shutdown.child_token());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("shutting down...");
    shutdown.cancel();
    let (s, g, a) = tokio::join!(scatterer, gatherer, analyzer);
    for (name, res) in [("scatterer", s), ("gatherer", g), ("analyzer", a)] {
        if let Err(e) = res {
            warn!("{name} task ended abnormally: {e}");
        }
    }

    if let Err(e) = client.disconnect().await {
        warn!("MQTT disconnect failed: {e}");
    }
    if tokio::time::timeout(Duration::from_secs(2), &mut driver).await.is_err() {
        driver_stop.cancel();
        let _ = driver.await;
    }

    info!("aggregator stopped ({} units tracked)", store.len());
    Ok(())
}
