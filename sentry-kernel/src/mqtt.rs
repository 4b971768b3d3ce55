/*!
 * SOURCE MQTT - Abonnement aux documents `live`, `ctrl` et `live/online`
 *
 * Chaque publish devient un événement dans la boîte aux lettres du moteur.
 * Les erreurs de l'event loop deviennent des erreurs de transport (le moteur
 * décide seul du LINK LOST), puis on retente après 2s. Chaque ConnAck
 * signale au moteur que le transport est revenu.
 */

use crate::config::MqttConf;
use crate::control::{CommandSink, ControlError, ControlPatch};
use crate::engine::{EngineEvent, EngineSender};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Topics dérivés du préfixe (`sentry` par défaut)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub live: String,
    pub ctrl: String,
    pub online: String,
    pub ctrl_set: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        Self {
            live: format!("{prefix}/live"),
            ctrl: format!("{prefix}/ctrl"),
            online: format!("{prefix}/live/online"),
            ctrl_set: format!("{prefix}/ctrl/set"),
        }
    }

    /// Traduit un publish entrant en événement moteur
    pub fn route(&self, topic: &str, payload: &[u8]) -> Option<EngineEvent> {
        let raw = || {
            serde_json::from_slice(payload).unwrap_or_else(|e| {
                warn!("[mqtt] non-JSON payload on {topic}: {e}");
                serde_json::Value::Null
            })
        };
        if topic == self.live {
            Some(EngineEvent::Snapshot(raw()))
        } else if topic == self.ctrl {
            Some(EngineEvent::ControlEcho(raw()))
        } else if topic == self.online {
            Some(EngineEvent::OnlineHint(raw()))
        } else {
            None
        }
    }
}

pub fn create_mqtt_client(cfg: &MqttConf) -> (AsyncClient, rumqttc::EventLoop) {
    let mut opts = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
    opts.set_keep_alive(Duration::from_secs(15));
    AsyncClient::new(opts, 10)
}

/// Lance la task d'abonnement; à rattacher au moteur via `EngineHandle::attach`
pub fn spawn_mqtt_listener(
    client: AsyncClient,
    mut eventloop: rumqttc::EventLoop,
    topics: Topics,
    engine: EngineSender,
) -> JoinHandle<()> {
    task::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("[mqtt] connected, subscribing to {}", topics.live);
                    if !engine.send(EngineEvent::LinkUp).await {
                        break;
                    }
                    // les abonnements sont perdus à chaque reconnexion (clean session)
                    for topic in [&topics.live, &topics.ctrl, &topics.online] {
                        if let Err(e) = client.subscribe(topic.as_str(), QoS::AtLeastOnce).await {
                            warn!("[mqtt] subscribe {topic} failed: {e:?}");
                        }
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    let Some(event) = topics.route(&p.topic, &p.payload) else {
                        debug!("[mqtt] ignoring topic {}", p.topic);
                        continue;
                    };
                    if !engine.send(event).await {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    if !engine.send(EngineEvent::TransportError(format!("MQTT: {e}"))).await {
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
        debug!("[mqtt] listener stopped");
    })
}

/// Écrit les patchs de contrôle sur `<prefix>/ctrl/set`
#[derive(Clone)]
pub struct MqttCommandSink {
    client: AsyncClient,
    topic: String,
}

impl MqttCommandSink {
    pub fn new(client: AsyncClient, topics: &Topics) -> Self {
        Self {
            client,
            topic: topics.ctrl_set.clone(),
        }
    }
}

#[async_trait]
impl CommandSink for MqttCommandSink {
    async fn write_patch(&self, patch: &ControlPatch) -> Result<(), ControlError> {
        let payload = serde_json::to_vec(patch)?;
        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| ControlError::Write(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics_from_prefix() {
        let t = Topics::new("sentry");
        assert_eq!(t.live, "sentry/live");
        assert_eq!(t.ctrl, "sentry/ctrl");
        assert_eq!(t.online, "sentry/live/online");
        assert_eq!(t.ctrl_set, "sentry/ctrl/set");
    }

    #[test]
    fn test_route_by_topic() {
        let t = Topics::new("sentry");
        match t.route("sentry/live", br#"{"T": 21}"#) {
            Some(EngineEvent::Snapshot(v)) => assert_eq!(v["T"], 21),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(t.route("sentry/ctrl", b"{}"), Some(EngineEvent::ControlEcho(_))));
        assert!(matches!(t.route("sentry/live/online", b"true"), Some(EngineEvent::OnlineHint(_))));
        assert!(t.route("other/topic", b"{}").is_none());
    }

    #[test]
    fn test_garbage_payload_becomes_null() {
        let t = Topics::new("sentry");
        match t.route("sentry/live", b"\xff\x00 not json") {
            Some(EngineEvent::Snapshot(v)) => assert!(v.is_null()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
