/*!
Test Harness pour le kernel SENTRY-360

Facilite l'écriture de tests avec:
- Moteur démarré sur une horloge manuelle (le temps n'avance que sur demande)
- Store en mémoire branché comme canal de commande
- Lectures ordonnées après les événements déjà envoyés
*/

use crate::store_stub::MockStore;
use anyhow::Result;
use sentry_kernel::clock::{Clock, ManualClock};
use sentry_kernel::config::EngineConfig;
use sentry_kernel::control::{ControlChannel, ControlMode};
use sentry_kernel::{EngineHandle, EngineView, TelemetryEngine};
use serde_json::Value;
use std::sync::Arc;

/// Le timer interne ne doit pas interférer : on contrôle via `check()`
const HARNESS_CHECK_MS: u64 = 3_600_000;

pub struct TestHarness {
    pub clock: ManualClock,
    pub store: MockStore,
    pub engine: Arc<EngineHandle>,
}

impl TestHarness {
    /// Harness avec timeout hors-ligne et capacité d'historique donnés
    pub fn new(offline_timeout_ms: u64, history_len: usize) -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        let cfg = EngineConfig {
            offline_timeout_ms,
            history_len,
            stale_check_ms: HARNESS_CHECK_MS,
            ..EngineConfig::default()
        };
        Self::with_config(cfg, 0)
    }

    pub fn with_config(cfg: EngineConfig, start_ms: i64) -> Self {
        let clock = ManualClock::new(start_ms);
        let store = MockStore::new();
        let engine = EngineHandle::spawn(TelemetryEngine::new(cfg, clock.now_ms()), Arc::new(clock.clone()))
            .with_command_sink(Arc::new(store.clone()));
        Self {
            clock,
            store,
            engine: Arc::new(engine),
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn advance(&self, ms: i64) {
        self.clock.advance(ms);
    }

    /// Publie un snapshot `live` (via le store) et retourne la vue qui suit
    pub async fn push(&self, snapshot: Value) -> Result<EngineView> {
        self.store.set_live(snapshot);
        if !self.store.publish_live(&self.engine.sender()).await {
            anyhow::bail!("engine stopped");
        }
        self.view().await
    }

    pub async fn fail_link(&self, err: &str) -> Result<EngineView> {
        let sent = self
            .engine
            .sender()
            .send(sentry_kernel::EngineEvent::TransportError(err.to_string()))
            .await;
        if !sent {
            anyhow::bail!("engine stopped");
        }
        self.view().await
    }

    /// Force le contrôle de fraîcheur à l'instant courant
    pub async fn check(&self) -> Result<EngineView> {
        self.engine.check_now().await;
        self.view().await
    }

    /// Demande un mode puis laisse le store renvoyer son écho
    pub async fn request_and_echo(&self, channel: ControlChannel, mode: ControlMode) -> Result<EngineView> {
        self.engine.request_mode(channel, mode).await;
        self.store.echo_ctrl(&self.engine.sender()).await;
        self.view().await
    }

    pub async fn view(&self) -> Result<EngineView> {
        self.engine
            .view()
            .await
            .ok_or_else(|| anyhow::anyhow!("engine stopped"))
    }

    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}
