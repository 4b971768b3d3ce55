/*!
Store realtime en mémoire pour développement sans Firebase/broker

Garde les documents `live` et `ctrl`, applique les patchs de contrôle en
merge (comme le vrai store) et enregistre chaque écriture pour les assertions.
Peut simuler une panne d'écriture.
*/

use async_trait::async_trait;
use sentry_kernel::control::{CommandSink, ControlError, ControlPatch};
use sentry_kernel::engine::{EngineEvent, EngineSender};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct StoreState {
    live: Value,
    ctrl: Map<String, Value>,
    writes: Vec<Value>,
    fail_writes: Option<String>,
}

/// Mock du store realtime, partageable entre moteur et test
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remplace le document `live`
    pub fn set_live(&self, live: Value) {
        self.state.lock().unwrap().live = live;
    }

    pub fn live(&self) -> Value {
        self.state.lock().unwrap().live.clone()
    }

    /// Document `ctrl` après merge de tous les patchs
    pub fn ctrl(&self) -> Value {
        Value::Object(self.state.lock().unwrap().ctrl.clone())
    }

    /// Patchs reçus, dans l'ordre
    pub fn get_writes(&self) -> Vec<Value> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Fait échouer les écritures suivantes (None pour rétablir)
    pub fn fail_writes(&self, err: Option<&str>) {
        self.state.lock().unwrap().fail_writes = err.map(str::to_string);
    }

    /// Pousse le document `live` courant vers le moteur
    pub async fn publish_live(&self, engine: &EngineSender) -> bool {
        engine.send(EngineEvent::Snapshot(self.live())).await
    }

    /// Renvoie l'écho du document `ctrl` au moteur (confirmation du store)
    pub async fn echo_ctrl(&self, engine: &EngineSender) -> bool {
        log::info!("[MOCK] echo ctrl {}", self.ctrl());
        engine.send(EngineEvent::ControlEcho(self.ctrl())).await
    }

    pub fn clear(&self) {
        *self.state.lock().unwrap() = StoreState::default();
    }
}

#[async_trait]
impl CommandSink for MockStore {
    async fn write_patch(&self, patch: &ControlPatch) -> Result<(), ControlError> {
        let value = patch.to_json()?;
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.fail_writes {
            return Err(ControlError::Write(err.clone()));
        }
        if let Value::Object(fields) = &value {
            for (k, v) in fields {
                state.ctrl.insert(k.clone(), v.clone());
            }
        }
        log::info!("[MOCK] ctrl patch {}", value);
        state.writes.push(value);
        Ok(())
    }
}

/// Builder de snapshots `live` au format du device
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    fields: Map<String, Value>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot "nominal" : device en ligne, statut NORMAL
    pub fn normal(seq: i64) -> Self {
        Self::new()
            .field("device", json!("SENTRY-360"))
            .field("online", json!(true))
            .field("estado", json!("NORMAL"))
            .field("motivo", json!("-"))
            .seq(seq)
    }

    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn seq(self, seq: i64) -> Self {
        self.field("seq", json!(seq))
    }

    pub fn ts_server(self, ts: i64) -> Self {
        self.field("ts_server", json!(ts))
    }

    pub fn ts_ms(self, ts: i64) -> Self {
        self.field("ts_ms", json!(ts))
    }

    pub fn temperature(self, t: f64) -> Self {
        self.field("T", json!(t))
    }

    pub fn humidity(self, h: f64) -> Self {
        self.field("H", json!(h))
    }

    pub fn gas(self, gas: f64) -> Self {
        self.field("gas", json!(gas))
    }

    pub fn luz(self, luz: f64) -> Self {
        self.field("luz", json!(luz))
    }

    pub fn estado(self, estado: &str) -> Self {
        self.field("estado", json!(estado))
    }

    pub fn actuators(self, light_on: bool, fan_on: bool) -> Self {
        self.field("lightOn", json!(light_on)).field("fanOn", json!(fan_on))
    }

    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }
}
