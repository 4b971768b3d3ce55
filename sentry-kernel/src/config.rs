/*!
 * CONFIGURATION KERNEL - kernel.yaml + surcharges d'environnement
 *
 * Ordre : valeurs par défaut <- fichier YAML (SENTRY_KERNEL_CONFIG, défaut
 * kernel.yaml) <- variables SENTRY_*. Les bornes sont appliquées en dernier.
 * Un fichier absent ou invalide n'est jamais fatal.
 */

use crate::freshness::DEFAULT_OFFLINE_TIMEOUT_MS;
use crate::history::DEFAULT_HISTORY_LEN;
use crate::models::DEFAULT_DEVICE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

pub const POLL_INTERVAL_RANGE_MS: (u64, u64) = (200, 60_000);
pub const HISTORY_LEN_RANGE: (usize, usize) = (1, 10_000);
pub const STALE_CHECK_RANGE_MS: (u64, u64) = (50, 10_000);
/// un jour
pub const MAX_OFFLINE_TIMEOUT_MS: u64 = 86_400_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub engine: EngineConfig,
    pub source: SourceKind,
    pub mqtt: MqttConf,
    pub rest: RestConf,
    pub http: HttpConf,
}

/// Politique du moteur de fraîcheur
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub device_name: String,
    pub offline_timeout_ms: u64,
    pub stale_check_ms: u64,
    pub poll_interval_ms: u64,
    pub history_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE.into(),
            offline_timeout_ms: DEFAULT_OFFLINE_TIMEOUT_MS,
            stale_check_ms: 200,
            poll_interval_ms: 1000,
            history_len: DEFAULT_HISTORY_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// abonnement MQTT (push)
    #[default]
    Mqtt,
    /// polling REST/JSON du store
    Rest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic_prefix: String,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "sentry-kernel".into(),
            topic_prefix: "sentry".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConf {
    /// ex: https://<projet>.firebaseio.com
    pub base_url: String,
}

impl Default for RestConf {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConf {
    pub addr: String,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".into(),
        }
    }
}

impl KernelConfig {
    pub fn from_yaml(txt: &str) -> Result<Self, ConfigError> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(txt)?)
    }

    /// Applique les variables SENTRY_* (valeurs illisibles ignorées)
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("[config] ignoring {key}={raw}: not a number");
                    None
                }
            }
        }

        if let Some(v) = parse("SENTRY_OFFLINE_TIMEOUT_MS", lookup("SENTRY_OFFLINE_TIMEOUT_MS")) {
            self.engine.offline_timeout_ms = v;
        }
        if let Some(v) = parse("SENTRY_POLL_INTERVAL_MS", lookup("SENTRY_POLL_INTERVAL_MS")) {
            self.engine.poll_interval_ms = v;
        }
        if let Some(v) = parse("SENTRY_STALE_CHECK_MS", lookup("SENTRY_STALE_CHECK_MS")) {
            self.engine.stale_check_ms = v;
        }
        if let Some(v) = parse("SENTRY_HISTORY_LEN", lookup("SENTRY_HISTORY_LEN")) {
            self.engine.history_len = v;
        }
        if let Some(name) = lookup("SENTRY_DEVICE_NAME").filter(|s| !s.trim().is_empty()) {
            self.engine.device_name = name;
        }
        if let Some(kind) = lookup("SENTRY_SOURCE") {
            match kind.trim().to_ascii_lowercase().as_str() {
                "mqtt" => self.source = SourceKind::Mqtt,
                "rest" => self.source = SourceKind::Rest,
                other => warn!("[config] unknown SENTRY_SOURCE '{other}', keeping {:?}", self.source),
            }
        }
        if let Some(url) = lookup("SENTRY_REST_URL") {
            self.rest.base_url = url;
        }
        if let Some(addr) = lookup("SENTRY_HTTP_ADDR") {
            self.http.addr = addr;
        }
    }

    /// Ramène les réglages dans des plages raisonnables
    pub fn clamp(&mut self) {
        let e = &mut self.engine;
        e.poll_interval_ms = e.poll_interval_ms.clamp(POLL_INTERVAL_RANGE_MS.0, POLL_INTERVAL_RANGE_MS.1);
        e.stale_check_ms = e.stale_check_ms.clamp(STALE_CHECK_RANGE_MS.0, STALE_CHECK_RANGE_MS.1);
        e.history_len = e.history_len.clamp(HISTORY_LEN_RANGE.0, HISTORY_LEN_RANGE.1);
        if e.offline_timeout_ms == 0 {
            e.offline_timeout_ms = DEFAULT_OFFLINE_TIMEOUT_MS;
        }
        e.offline_timeout_ms = e.offline_timeout_ms.min(MAX_OFFLINE_TIMEOUT_MS);
        self.rest.base_url = self.rest.base_url.trim_end_matches('/').to_string();
        self.mqtt.topic_prefix = self.mqtt.topic_prefix.trim_matches('/').to_string();
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("SENTRY_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        match fs::read_to_string(&path).await.map_err(ConfigError::from).and_then(|txt| KernelConfig::from_yaml(&txt)) {
            Ok(cfg) => {
                info!("[config] loaded {path}");
                cfg
            }
            Err(e) => {
                warn!("[config] invalid config {path}: {e}, using defaults");
                KernelConfig::default()
            }
        }
    } else {
        info!("[config] no {path}, using defaults");
        KernelConfig::default()
    };
    cfg.apply_env(|key| std::env::var(key).ok());
    cfg.clamp();
    cfg
}
