/*!
 * SOURCE REST - Polling du store realtime via son API JSON
 *
 * À chaque intervalle : GET `live.json`, `ctrl.json`, `live/online.json`.
 * Un échec HTTP sur `live` est une erreur de transport, sur `ctrl` une erreur
 * du lien contrôle. Les commandes partent en PATCH (merge) sur `ctrl.json`.
 */

use crate::control::{CommandSink, ControlError, ControlPatch};
use crate::engine::{EngineEvent, EngineSender};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected status {status} for {url}")]
    Status { status: u16, url: String },
}

/// Chemins du store, relatifs à l'URL de base
#[derive(Debug, Clone)]
pub struct StorePaths {
    base_url: String,
}

impl StorePaths {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn live(&self) -> String {
        format!("{}/live.json", self.base_url)
    }

    pub fn ctrl(&self) -> String {
        format!("{}/ctrl.json", self.base_url)
    }

    pub fn online(&self) -> String {
        format!("{}/live/online.json", self.base_url)
    }
}

async fn fetch_json(client: &Client, url: &str) -> Result<Value, TransportError> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(TransportError::Status {
            status: resp.status().as_u16(),
            url: url.to_string(),
        });
    }
    // corps illisible = snapshot malformé, la normalisation s'en charge
    Ok(resp.json::<Value>().await.unwrap_or(Value::Null))
}

/// Lance la boucle de polling; à rattacher au moteur via `EngineHandle::attach`
pub fn spawn_rest_poller(
    client: Client,
    paths: StorePaths,
    poll_interval: Duration,
    engine: EngineSender,
) -> JoinHandle<()> {
    task::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        // pas de rattrapage : un poll lent ne doit pas déclencher une rafale
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let live = match fetch_json(&client, &paths.live()).await {
                Ok(raw) => EngineEvent::Snapshot(raw),
                Err(e) => EngineEvent::TransportError(e.to_string()),
            };
            let ctrl = match fetch_json(&client, &paths.ctrl()).await {
                Ok(raw) => EngineEvent::ControlEcho(raw),
                Err(e) => EngineEvent::ControlError(e.to_string()),
            };
            let online = fetch_json(&client, &paths.online()).await.ok().map(EngineEvent::OnlineHint);

            for event in [Some(live), Some(ctrl), online].into_iter().flatten() {
                if !engine.send(event).await {
                    debug!("[rest] engine stopped, poller exiting");
                    return;
                }
            }
        }
    })
}

pub struct RestCommandSink {
    client: Client,
    paths: StorePaths,
}

impl RestCommandSink {
    pub fn new(client: Client, paths: StorePaths) -> Self {
        Self { client, paths }
    }
}

#[async_trait]
impl CommandSink for RestCommandSink {
    async fn write_patch(&self, patch: &ControlPatch) -> Result<(), ControlError> {
        let url = self.paths.ctrl();
        let resp = self
            .client
            .patch(&url)
            .json(patch)
            .send()
            .await
            .map_err(|e| ControlError::Write(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ControlError::Write(format!("status {} for {}", resp.status().as_u16(), url)));
        }
        Ok(())
    }
}
