/*!
 * MOTEUR DE FRAÎCHEUR - Cœur du kernel SENTRY-360
 *
 * RÔLE :
 * Possède seul la télémétrie courante, l'état LIVE/STALE, les buffers
 * d'historique et l'état de contrôle désiré. Tout passe par une boîte aux
 * lettres traitée par une seule task : ingestion, erreurs de transport,
 * échos du contrôle, contrôle périodique de fraîcheur, lectures.
 *
 * ORDRE PAR INGESTION (sans entrelacement) :
 * normalisation -> marqueur -> transition -> historique -> publication de la vue
 *
 * CYCLE DE VIE :
 * `EngineHandle::spawn` démarre la task + le timer; `shutdown` arrête la
 * task, le timer et les sources attachées (idempotent).
 */

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::control::{CommandSink, ControlChannel, ControlMode, ControlPatch, ControlState};
use crate::freshness::{select_marker, timeout_as_i64, FreshnessState, Liveness, Observation, StaleReason};
use crate::health::{EngineStats, NetStatus};
use crate::history::HistorySet;
use crate::models::{coerce_bool, normalize_with_device, RawSnapshot, Telemetry};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const MAILBOX_SIZE: usize = 64;

/// Vue en lecture seule publiée aux consommateurs
#[derive(Debug, Clone, Serialize)]
pub struct EngineView {
    /// télémétrie exposée (statut forcé OFFLINE si STALE)
    pub telemetry: Telemetry,
    pub freshness: FreshnessState,
    pub history: HistorySet,
    /// état désiré (écho du store)
    pub control: ControlState,
    pub net: NetStatus,
    pub ctrl_net: NetStatus,
    /// indice auxiliaire `live/online`, non autoritaire
    pub online_hint: Option<bool>,
    pub stats: EngineStats,
}

/// État du moteur, sans I/O ni timer : toutes les méthodes prennent `now_ms`
pub struct TelemetryEngine {
    cfg: EngineConfig,
    latest: Telemetry,
    freshness: FreshnessState,
    history: HistorySet,
    control: ControlState,
    net: NetStatus,
    ctrl_net: NetStatus,
    /// dernier échec d'écriture, effacé seulement par une écriture réussie
    pending_write_err: Option<String>,
    online_hint: Option<bool>,
    stats: EngineStats,
}

impl TelemetryEngine {
    pub fn new(cfg: EngineConfig, now_ms: i64) -> Self {
        let latest = normalize_with_device(&RawSnapshot::Null, &cfg.device_name);
        let history = HistorySet::new(cfg.history_len);
        Self {
            cfg,
            latest,
            freshness: FreshnessState::new(now_ms),
            history,
            control: ControlState::default(),
            net: NetStatus::default(),
            ctrl_net: NetStatus::default(),
            pending_write_err: None,
            online_hint: None,
            stats: EngineStats::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Ingestion d'un snapshot brut
    pub fn ingest(&mut self, raw: &RawSnapshot, now_ms: i64) -> Observation {
        let norm = normalize_with_device(raw, &self.cfg.device_name);
        let was_stale = self.freshness.is_stale();
        let obs = self.freshness.observe(select_marker(&norm), now_ms);

        self.stats.snapshots += 1;
        match obs {
            Observation::Distinct(marker) => {
                self.stats.distinct += 1;
                let ts = norm.ts_ms.unwrap_or(now_ms);
                self.history.append(&norm, ts);
                if was_stale {
                    info!("[engine] LIVE again (marker {:?})", marker);
                }
            }
            Observation::Duplicate => self.stats.duplicates += 1,
            Observation::NoMarker => {
                self.stats.unmarked += 1;
                debug!("[engine] snapshot without ts_server/seq, change undetectable");
            }
        }

        // données reçues : le lien est sain, seul le gel des données peut rester en cause
        self.record_link_up(now_ms);
        self.latest = norm;
        obs
    }

    /// Transport de nouveau connecté (ConnAck, snapshot reçu). LINK LOST redevient
    /// STALE DATA; seul un marqueur nouveau repasse LIVE.
    pub fn record_link_up(&mut self, now_ms: i64) {
        self.net.mark_ok(now_ms);
        if self.freshness.liveness == Liveness::Stale(StaleReason::LinkLost) {
            self.freshness.force_stale(StaleReason::StaleData);
            info!("[engine] telemetry link back, waiting for fresh data");
        }
    }

    pub fn record_transport_error(&mut self, err: &str, now_ms: i64) {
        self.stats.transport_errors += 1;
        warn!("[engine] telemetry link error: {err}");
        self.net.mark_err(err, now_ms);
    }

    /// Contrôle périodique : LINK LOST si la panne dure, STALE DATA si plus rien de neuf.
    /// N'ajoute jamais d'historique et ne touche pas au marqueur.
    pub fn check(&mut self, now_ms: i64) -> bool {
        let timeout = self.cfg.offline_timeout_ms;
        let mut changed = false;

        if let Some(down) = self.net.down_for_ms(now_ms) {
            if down > timeout_as_i64(timeout) {
                changed |= self.freshness.force_stale(StaleReason::LinkLost);
            }
        }
        changed |= self.freshness.check(self.latest.ts_server, now_ms, timeout);

        if changed {
            if let Liveness::Stale(reason) = self.freshness.liveness {
                warn!(
                    "[engine] OFFLINE: {} (age {}ms > {}ms)",
                    reason.as_str(),
                    self.freshness.age_ms(self.latest.ts_server, now_ms),
                    timeout
                );
            }
        }
        changed
    }

    pub fn apply_control_echo(&mut self, raw: &RawSnapshot, now_ms: i64) {
        self.control = ControlState::from_echo(raw);
        // relire `ctrl` ne dit rien de la dernière écriture
        if self.pending_write_err.is_none() {
            self.ctrl_net.mark_ok(now_ms);
        }
        debug!("[engine] ctrl echo luz={} fan={}", self.control.luz_mode, self.control.fan_mode);
    }

    pub fn record_control_error(&mut self, err: &str, now_ms: i64) {
        self.stats.control_errors += 1;
        warn!("[engine] control link error: {err}");
        self.ctrl_net.mark_err(err, now_ms);
    }

    pub fn record_control_write(&mut self, result: Result<(), String>, now_ms: i64) {
        match result {
            Ok(()) => {
                self.pending_write_err = None;
                self.ctrl_net.mark_ok(now_ms);
            }
            Err(err) => {
                self.record_control_error(&err, now_ms);
                self.pending_write_err = Some(err);
            }
        }
    }

    pub fn record_online_hint(&mut self, raw: &RawSnapshot) {
        self.online_hint = (!raw.is_null()).then(|| coerce_bool(Some(raw)));
    }

    /// Télémétrie telle qu'affichée : seuls online/estado/motivo sont surchargés
    pub fn exposed_telemetry(&self) -> Telemetry {
        let mut t = self.latest.clone();
        if let Liveness::Stale(reason) = self.freshness.liveness {
            t.online = false;
            t.estado = "OFFLINE".into();
            t.motivo = reason.as_str().into();
        }
        t
    }

    /// Dernière télémétrie normalisée, sans surcharge OFFLINE
    pub fn latest_raw(&self) -> &Telemetry {
        &self.latest
    }

    pub fn freshness(&self) -> &FreshnessState {
        &self.freshness
    }

    pub fn history(&self) -> &HistorySet {
        &self.history
    }

    pub fn control(&self) -> &ControlState {
        &self.control
    }

    pub fn view(&self) -> EngineView {
        EngineView {
            telemetry: self.exposed_telemetry(),
            freshness: self.freshness.clone(),
            history: self.history.clone(),
            control: self.control,
            net: self.net.clone(),
            ctrl_net: self.ctrl_net.clone(),
            online_hint: self.online_hint,
            stats: self.stats.clone(),
        }
    }
}

/// Messages de la boîte aux lettres du moteur
#[derive(Debug)]
pub enum EngineEvent {
    Snapshot(RawSnapshot),
    TransportError(String),
    /// transport reconnecté, sans données pour autant
    LinkUp,
    ControlEcho(RawSnapshot),
    /// échec de lecture du document `ctrl`
    ControlError(String),
    /// issue d'une écriture `request_mode`
    ControlWrite(Result<(), String>),
    OnlineHint(RawSnapshot),
    CheckStaleness,
    View(oneshot::Sender<EngineView>),
}

/// Côté émetteur, cloné par chaque source
#[derive(Clone)]
pub struct EngineSender {
    tx: mpsc::Sender<EngineEvent>,
}

impl EngineSender {
    /// false si le moteur est arrêté
    pub async fn send(&self, event: EngineEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct EngineHandle {
    sender: EngineSender,
    view_rx: watch::Receiver<EngineView>,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn CommandSink>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    actor: Mutex<Option<JoinHandle<()>>>,
    sources: Mutex<Vec<JoinHandle<()>>>,
}

impl EngineHandle {
    /// Démarre la task du moteur et son timer de contrôle
    pub fn spawn(engine: TelemetryEngine, clock: Arc<dyn Clock>) -> Self {
        let check_every = Duration::from_millis(engine.config().stale_check_ms.max(1));
        let (tx, rx) = mpsc::channel(MAILBOX_SIZE);
        let (view_tx, view_rx) = watch::channel(engine.view());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        info!(
            "[engine] starting (timeout {}ms, check every {}ms, history {} pts)",
            engine.config().offline_timeout_ms,
            check_every.as_millis(),
            engine.config().history_len
        );

        let actor = tokio::spawn(run_engine(engine, clock.clone(), rx, view_tx, shutdown_rx, check_every));

        Self {
            sender: EngineSender { tx },
            view_rx,
            clock,
            sink: None,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            actor: Mutex::new(Some(actor)),
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn with_command_sink(mut self, sink: Arc<dyn CommandSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn sender(&self) -> EngineSender {
        self.sender.clone()
    }

    /// Rattache une task source (abonnement, polling) arrêtée avec le moteur
    pub fn attach(&self, task: JoinHandle<()>) {
        // verrou tenu jusqu'au push : `shutdown` ne peut pas vider `sources` entre les deux
        let running = self.shutdown_tx.lock();
        if running.is_none() {
            task.abort();
            return;
        }
        self.sources.lock().push(task);
    }

    pub async fn ingest(&self, raw: RawSnapshot) -> bool {
        self.sender.send(EngineEvent::Snapshot(raw)).await
    }

    pub async fn check_now(&self) -> bool {
        self.sender.send(EngineEvent::CheckStaleness).await
    }

    /// Vue ordonnée après tous les événements déjà envoyés; None si arrêté
    pub async fn view(&self) -> Option<EngineView> {
        let (tx, rx) = oneshot::channel();
        if !self.sender.send(EngineEvent::View(tx)).await {
            return None;
        }
        rx.await.ok()
    }

    /// Dernière vue publiée, sans passer par la boîte aux lettres
    pub fn latest(&self) -> EngineView {
        self.view_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineView> {
        self.view_rx.clone()
    }

    /// Envoie `{mode, ts_ms}` au store. L'état désiré n'est pas touché ici :
    /// il suivra l'écho du store. Un échec reste visible dans `ctrl_net`
    /// jusqu'à la prochaine écriture réussie.
    pub async fn request_mode(&self, channel: ControlChannel, mode: ControlMode) {
        let patch = ControlPatch::new(channel, mode, self.clock.now_ms());
        let result = match &self.sink {
            Some(sink) => sink.write_patch(&patch).await.map_err(|e| e.to_string()),
            None => Err("no command sink configured".to_string()),
        };
        if result.is_ok() {
            info!("[engine] requested {:?} -> {}", channel, mode);
        }
        if !self.sender.send(EngineEvent::ControlWrite(result)).await {
            warn!("[engine] stopped, result of {:?} -> {} request dropped", channel, mode);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Arrête sources, timer et task; un second appel ne fait rien
    pub async fn shutdown(&self) {
        let Some(tx) = self.shutdown_tx.lock().take() else {
            return;
        };
        for task in self.sources.lock().drain(..) {
            task.abort();
        }
        let _ = tx.send(());
        let actor = self.actor.lock().take();
        if let Some(actor) = actor {
            let _ = actor.await;
        }
        info!("[engine] stopped");
    }
}

async fn run_engine(
    mut engine: TelemetryEngine,
    clock: Arc<dyn Clock>,
    mut rx: mpsc::Receiver<EngineEvent>,
    view_tx: watch::Sender<EngineView>,
    mut shutdown_rx: oneshot::Receiver<()>,
    check_every: Duration,
) {
    let mut ticker = tokio::time::interval(check_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {
                if engine.check(clock.now_ms()) {
                    view_tx.send_replace(engine.view());
                }
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                let now = clock.now_ms();
                match event {
                    EngineEvent::Snapshot(raw) => {
                        engine.ingest(&raw, now);
                    }
                    EngineEvent::TransportError(err) => engine.record_transport_error(&err, now),
                    EngineEvent::LinkUp => engine.record_link_up(now),
                    EngineEvent::ControlEcho(raw) => engine.apply_control_echo(&raw, now),
                    EngineEvent::ControlError(err) => engine.record_control_error(&err, now),
                    EngineEvent::ControlWrite(result) => engine.record_control_write(result, now),
                    EngineEvent::OnlineHint(raw) => engine.record_online_hint(&raw),
                    EngineEvent::CheckStaleness => {
                        engine.check(now);
                    }
                    EngineEvent::View(reply) => {
                        let _ = reply.send(engine.view());
                        continue;
                    }
                }
                view_tx.send_replace(engine.view());
            }
        }
    }
    debug!("[engine] loop exited");
}
