/*!
 * SENTRY KERNEL - Moteur de fraîcheur de télémétrie pour le guardian SENTRY-360
 *
 * RÔLE : Normalise les snapshots du device, décide LIVE/STALE, tient
 * l'historique par capteur et relaie les commandes luz/fan vers le store.
 *
 * ARCHITECTURE : un moteur possédé par une seule task (boîte aux lettres) +
 * sources MQTT/REST + API console Axum.
 */

pub mod clock;
pub mod config;
pub mod control;
pub mod display;
pub mod engine;
pub mod freshness;
pub mod health;
pub mod history;
pub mod http;
pub mod models;
pub mod mqtt;
pub mod rest;

pub use engine::{EngineEvent, EngineHandle, EngineSender, EngineView, TelemetryEngine};
pub use models::{normalize, Metric, RawSnapshot, Telemetry};
