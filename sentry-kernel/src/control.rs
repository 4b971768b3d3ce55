/*!
 * CONTRÔLE - État désiré des actionneurs (luz, fan) + canal de commande
 *
 * RÔLE :
 * La console demande un mode (ON/OFF/AUTO) par canal; la demande part en
 * patch vers le store (`ctrl`). L'état désiré local n'est mis à jour que par
 * l'écho du store, jamais de façon optimiste. L'état réel (lightOn/fanOn)
 * vient de la télémétrie du device et reste séparé.
 */

use crate::models::{coerce_i64, RawSnapshot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Unknown control channel: {0}")]
    UnknownChannel(String),
    #[error("Unknown control mode: {0}")]
    UnknownMode(String),
    #[error("Command write failed: {0}")]
    Write(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlMode {
    On,
    Off,
    Auto,
}

impl ControlMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlMode::On => "ON",
            ControlMode::Off => "OFF",
            ControlMode::Auto => "AUTO",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlMode {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ON" => Ok(ControlMode::On),
            "OFF" => Ok(ControlMode::Off),
            "AUTO" => Ok(ControlMode::Auto),
            _ => Err(ControlError::UnknownMode(s.to_string())),
        }
    }
}

/// Actionneurs pilotables depuis la console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlChannel {
    Luz,
    Fan,
}

impl ControlChannel {
    /// Clé du mode dans le document `ctrl`
    pub fn mode_key(self) -> &'static str {
        match self {
            ControlChannel::Luz => "luzMode",
            ControlChannel::Fan => "fanMode",
        }
    }
}

impl FromStr for ControlChannel {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "luz" | "light" => Ok(ControlChannel::Luz),
            "fan" => Ok(ControlChannel::Fan),
            _ => Err(ControlError::UnknownChannel(s.to_string())),
        }
    }
}

/// État désiré, tel que confirmé par le store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlState {
    #[serde(rename = "luzMode")]
    pub luz_mode: ControlMode,
    #[serde(rename = "fanMode")]
    pub fan_mode: ControlMode,
    pub ts_ms: Option<i64>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            luz_mode: ControlMode::Off,
            fan_mode: ControlMode::Off,
            ts_ms: None,
        }
    }
}

impl ControlState {
    /// Normalise l'écho du document `ctrl`; mode inconnu ou absent => OFF
    pub fn from_echo(raw: &RawSnapshot) -> Self {
        let obj = raw.as_object();
        let mode = |key: &str| {
            obj.and_then(|o| o.get(key))
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(ControlMode::Off)
        };
        Self {
            luz_mode: mode("luzMode"),
            fan_mode: mode("fanMode"),
            ts_ms: coerce_i64(obj.and_then(|o| o.get("ts_ms"))),
        }
    }

    pub fn mode(&self, channel: ControlChannel) -> ControlMode {
        match channel {
            ControlChannel::Luz => self.luz_mode,
            ControlChannel::Fan => self.fan_mode,
        }
    }
}

/// Patch de merge écrit dans `ctrl` : un seul canal à la fois
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlPatch {
    #[serde(rename = "luzMode", skip_serializing_if = "Option::is_none")]
    pub luz_mode: Option<ControlMode>,
    #[serde(rename = "fanMode", skip_serializing_if = "Option::is_none")]
    pub fan_mode: Option<ControlMode>,
    pub ts_ms: i64,
}

impl ControlPatch {
    pub fn new(channel: ControlChannel, mode: ControlMode, ts_ms: i64) -> Self {
        let (luz_mode, fan_mode) = match channel {
            ControlChannel::Luz => (Some(mode), None),
            ControlChannel::Fan => (None, Some(mode)),
        };
        Self {
            luz_mode,
            fan_mode,
            ts_ms,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, ControlError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Canal d'écriture vers le store (MQTT, REST, stub de test)
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn write_patch(&self, patch: &ControlPatch) -> Result<(), ControlError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mode_parsing_is_case_insensitive() {
        assert_eq!("on".parse::<ControlMode>().unwrap(), ControlMode::On);
        assert_eq!(" Auto ".parse::<ControlMode>().unwrap(), ControlMode::Auto);
        assert!(matches!("blink".parse::<ControlMode>(), Err(ControlError::UnknownMode(_))));
    }

    #[test]
    fn test_channel_parsing() {
        assert_eq!("LUZ".parse::<ControlChannel>().unwrap(), ControlChannel::Luz);
        assert_eq!("light".parse::<ControlChannel>().unwrap(), ControlChannel::Luz);
        assert_eq!("fan".parse::<ControlChannel>().unwrap(), ControlChannel::Fan);
        assert!("pump".parse::<ControlChannel>().is_err());
    }

    #[test]
    fn test_patch_only_carries_one_channel() {
        let patch = ControlPatch::new(ControlChannel::Fan, ControlMode::Auto, 123);
        assert_eq!(patch.to_json().unwrap(), json!({"fanMode": "AUTO", "ts_ms": 123}));

        let patch = ControlPatch::new(ControlChannel::Luz, ControlMode::On, 9);
        assert_eq!(patch.to_json().unwrap(), json!({"luzMode": "ON", "ts_ms": 9}));
    }

    #[test]
    fn test_echo_normalization() {
        let st = ControlState::from_echo(&json!({"luzMode": "on", "fanMode": "auto", "ts_ms": 55}));
        assert_eq!(st.luz_mode, ControlMode::On);
        assert_eq!(st.fan_mode, ControlMode::Auto);
        assert_eq!(st.ts_ms, Some(55));

        let st = ControlState::from_echo(&json!({"luzMode": "DIM", "fanMode": 3}));
        assert_eq!(st, ControlState::default());

        assert_eq!(ControlState::from_echo(&serde_json::Value::Null), ControlState::default());
    }

    #[test]
    fn test_state_serializes_contract_keys() {
        let st = ControlState { luz_mode: ControlMode::On, fan_mode: ControlMode::Off, ts_ms: Some(1) };
        assert_eq!(
            serde_json::to_value(st).unwrap(),
            json!({"luzMode": "ON", "fanMode": "OFF", "ts_ms": 1})
        );
        assert_eq!(st.mode(ControlChannel::Luz), ControlMode::On);
    }
}
