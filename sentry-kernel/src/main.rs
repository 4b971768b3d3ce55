/*!
 * SENTRY KERNEL - Point d'entrée du back-end console SENTRY-360
 *
 * RÔLE : Orchestration de tous les modules : config, moteur, source (MQTT ou
 * REST), canal de commande, HTTP. Arrêt propre sur Ctrl-C.
 *
 * ARCHITECTURE : Arduino UNO (capteurs) -> ESP32 (gateway) -> store realtime
 * -> kernel (fraîcheur + historique) -> console.
 */
use sentry_kernel::clock::{Clock, SystemClock};
use sentry_kernel::config::{load_config, SourceKind};
use sentry_kernel::control::CommandSink;
use sentry_kernel::health::HealthTracker;
use sentry_kernel::http::{build_router, AppState};
use sentry_kernel::mqtt::{self, MqttCommandSink, Topics};
use sentry_kernel::rest::{self, RestCommandSink, StorePaths};
use sentry_kernel::{EngineHandle, TelemetryEngine};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sentry_kernel=info")),
        )
        .init();

    let cfg = load_config().await;
    info!("[kernel] device {} via {:?}", cfg.engine.device_name, cfg.source);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = TelemetryEngine::new(cfg.engine.clone(), clock.now_ms());
    let spawned = EngineHandle::spawn(engine, clock);
    let sender = spawned.sender();

    // source + canal de commande sur le même store
    let (handle, source) = match cfg.source {
        SourceKind::Mqtt => {
            let topics = Topics::new(&cfg.mqtt.topic_prefix);
            let (client, eventloop) = mqtt::create_mqtt_client(&cfg.mqtt);
            let sink: Arc<dyn CommandSink> = Arc::new(MqttCommandSink::new(client.clone(), &topics));
            info!("[kernel] MQTT {}:{} topics {}/*", cfg.mqtt.host, cfg.mqtt.port, cfg.mqtt.topic_prefix);
            let task = mqtt::spawn_mqtt_listener(client, eventloop, topics, sender);
            (spawned.with_command_sink(sink), task)
        }
        SourceKind::Rest => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_millis(cfg.engine.poll_interval_ms.max(1000)))
                .build()
                .context("failed to build HTTP client")?;
            let paths = StorePaths::new(&cfg.rest.base_url);
            let sink: Arc<dyn CommandSink> = Arc::new(RestCommandSink::new(client.clone(), paths.clone()));
            info!("[kernel] polling {} every {}ms", cfg.rest.base_url, cfg.engine.poll_interval_ms);
            let task = rest::spawn_rest_poller(
                client,
                paths,
                Duration::from_millis(cfg.engine.poll_interval_ms),
                sender,
            );
            (spawned.with_command_sink(sink), task)
        }
    };
    handle.attach(source);
    let engine = Arc::new(handle);

    let app = build_router(AppState {
        engine: engine.clone(),
        health_tracker: HealthTracker::new(),
    });

    let listener = TcpListener::bind(&cfg.http.addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.http.addr))?;
    info!("[kernel] listening on http://{}", cfg.http.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("HTTP server failed")?;

    engine.shutdown().await;
    Ok(())
}
