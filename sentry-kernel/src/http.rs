/*!
 * API CONSOLE SENTRY - Serveur HTTP du kernel
 *
 * RÔLE :
 * Remplace la couche de rendu du dashboard : vues JSON en lecture seule du
 * moteur + envoi des commandes de contrôle.
 *
 * ROUTES :
 * - GET  /health              santé kernel (uptime, liens, compteurs)
 * - GET  /telemetry           vue dashboard (statut, ton, niveau luz, liens)
 * - GET  /history             toutes les séries
 * - GET  /history/{metric}    une série + sa plage d'affichage
 * - GET  /control             désiré (écho store) vs réel (device)
 * - POST /control/{channel}   {"mode": "ON"|"OFF"|"AUTO"} -> 202, sinon 400
 */

use crate::control::{ControlChannel, ControlMode, ControlState};
use crate::display::{format_clock, format_reading, light_level, sensor_range, status_tone, SensorRange, StatusTone};
use crate::engine::{EngineHandle, EngineView};
use crate::freshness::FreshnessState;
use crate::health::{HealthTracker, KernelHealth, NetStatus};
use crate::history::{HistoryPoint, HistorySet};
use crate::models::{Metric, Telemetry};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<EngineHandle>,
    pub health_tracker: HealthTracker,
}

#[derive(Serialize)]
struct DashboardView {
    telemetry: Telemetry,
    freshness: FreshnessState,
    tone: StatusTone,
    luz_nivel: &'static str,
    readings: BTreeMap<&'static str, String>,
    ts_server_clock: String,
    net: NetStatus,
    ctrl_net: NetStatus,
    online_hint: Option<bool>,
}

fn to_dashboard(view: EngineView) -> DashboardView {
    let t = view.telemetry;
    let readings = Metric::ALL
        .into_iter()
        .map(|m| (m.key(), format_reading(m.read(&t))))
        .collect();
    DashboardView {
        tone: status_tone(&t.estado, t.online),
        luz_nivel: light_level(t.luz),
        readings,
        ts_server_clock: format_clock(t.ts_server),
        telemetry: t,
        freshness: view.freshness,
        net: view.net,
        ctrl_net: view.ctrl_net,
        online_hint: view.online_hint,
    }
}

#[derive(Serialize)]
struct SeriesView {
    metric: Metric,
    range: SensorRange,
    points: Vec<HistoryPoint>,
}

#[derive(Serialize)]
struct ChannelView {
    desired: ControlMode,
    actual_on: bool,
}

#[derive(Serialize)]
struct ControlView {
    desired: ControlState,
    luz: ChannelView,
    fan: ChannelView,
    ctrl_net: NetStatus,
    #[serde(rename = "lastCtrlErr")]
    last_ctrl_err: String,
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: String,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/telemetry", get(get_telemetry))
        .route("/history", get(get_history))
        .route("/history/{metric}", get(get_series))
        .route("/control", get(get_control))
        .route("/control/{channel}", post(request_mode))
        .with_state(app_state)
}

// GET /health
async fn get_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.engine.latest()))
}

// GET /telemetry
async fn get_telemetry(State(app): State<AppState>) -> Json<DashboardView> {
    Json(to_dashboard(app.engine.latest()))
}

// GET /history
async fn get_history(State(app): State<AppState>) -> Json<HistorySet> {
    Json(app.engine.latest().history)
}

// GET /history/{metric}
async fn get_series(
    State(app): State<AppState>,
    Path(metric): Path<String>,
) -> Result<Json<SeriesView>, StatusCode> {
    let metric = Metric::from_key(&metric).ok_or(StatusCode::NOT_FOUND)?;
    let points = app.engine.latest().history.get(metric).to_vec();
    Ok(Json(SeriesView {
        metric,
        range: sensor_range(metric),
        points,
    }))
}

// GET /control (désiré et réel restent séparés)
async fn get_control(State(app): State<AppState>) -> Json<ControlView> {
    let view = app.engine.latest();
    Json(ControlView {
        luz: ChannelView {
            desired: view.control.luz_mode,
            actual_on: view.telemetry.light_on,
        },
        fan: ChannelView {
            desired: view.control.fan_mode,
            actual_on: view.telemetry.fan_on,
        },
        desired: view.control,
        ctrl_net: view.ctrl_net,
        last_ctrl_err: view.telemetry.last_ctrl_err,
    })
}

// POST /control/{channel}
async fn request_mode(
    State(app): State<AppState>,
    Path(channel): Path<String>,
    payload: Result<Json<ModeRequest>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    // corps absent, illisible ou sans `mode` : même réponse 400 qu'un mode inconnu
    let parsed = payload.map_err(|e| e.body_text()).and_then(|Json(req)| {
        channel
            .parse::<ControlChannel>()
            .and_then(|c| req.mode.parse::<ControlMode>().map(|m| (c, m)))
            .map_err(|e| e.to_string())
    });
    let (channel, mode) = match parsed {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "ok": false, "msg": e })),
            )
        }
    };

    app.engine.request_mode(channel, mode).await;
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "ok": true, "channel": channel, "mode": mode })),
    )
}
