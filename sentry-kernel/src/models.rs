/*!
 * MODÈLES TÉLÉMÉTRIE - Snapshot brut du store -> Telemetry typée
 *
 * RÔLE :
 * Le store realtime pousse un objet JSON sans garantie de forme (null, champs
 * manquants, types faux, objets imbriqués). `normalize` le transforme toujours
 * en `Telemetry` complète, sans jamais échouer.
 *
 * RÈGLES DE COERCITION :
 * - nombres : fini après coercition numérique, sinon absent
 * - booléens : "truthy" après défaut à false
 * - chaînes : défaut fixe, jamais null
 */

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_DEVICE: &str = "SENTRY-360";
pub const DEFAULT_ESTADO: &str = "DESCONOCIDO";
pub const DEFAULT_MOTIVO: &str = "-";

/// Snapshot brut tel que reçu du store
pub type RawSnapshot = Value;

/// Télémétrie normalisée (noms de champs = contrat `live` du device)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub device: String,
    pub online: bool,
    pub estado: String,
    pub motivo: String,

    #[serde(rename = "T")]
    pub t: Option<f64>,
    #[serde(rename = "H")]
    pub h: Option<f64>,
    #[serde(rename = "HI")]
    pub hi: Option<f64>,
    pub gas: Option<f64>,
    pub base: Option<f64>,
    pub luz: Option<f64>,

    pub rain: bool,
    pub flame: bool,
    #[serde(rename = "soloPeligro")]
    pub solo_peligro: bool,

    pub seq: Option<i64>,
    /// epoch ms posé par le serveur (référence pour la fraîcheur)
    pub ts_server: Option<i64>,
    /// millis() du device, informatif uniquement
    pub ts_ms: Option<i64>,

    #[serde(rename = "lightOn")]
    pub light_on: bool,
    #[serde(rename = "fanOn")]
    pub fan_on: bool,
    #[serde(rename = "lastCtrlErr")]
    pub last_ctrl_err: String,
}

impl Default for Telemetry {
    fn default() -> Self {
        normalize(&Value::Null)
    }
}

/// Normalise un snapshot avec le nom de device par défaut
pub fn normalize(raw: &RawSnapshot) -> Telemetry {
    normalize_with_device(raw, DEFAULT_DEVICE)
}

/// Normalise un snapshot; `default_device` remplace un `device` manquant
pub fn normalize_with_device(raw: &RawSnapshot, default_device: &str) -> Telemetry {
    let obj = raw.as_object();
    let get = |key: &str| field(obj, key);

    Telemetry {
        device: coerce_string(get("device"), default_device),
        online: coerce_bool(get("online")),
        estado: coerce_string(get("estado"), DEFAULT_ESTADO),
        motivo: coerce_string(get("motivo"), DEFAULT_MOTIVO),

        t: coerce_f64(get("T")),
        h: coerce_f64(get("H")),
        hi: coerce_f64(get("HI")),
        gas: coerce_f64(get("gas")),
        base: coerce_f64(get("base")),
        luz: coerce_f64(get("luz")),

        rain: coerce_bool(get("rain")),
        flame: coerce_bool(get("flame")),
        solo_peligro: coerce_bool(get("soloPeligro")),

        seq: coerce_i64(get("seq")),
        ts_server: coerce_i64(get("ts_server")),
        // anciens firmwares publient `ts` au lieu de `ts_ms`
        ts_ms: coerce_i64(get("ts_ms")).or_else(|| coerce_i64(get("ts"))),

        light_on: coerce_bool(get("lightOn")),
        fan_on: coerce_bool(get("fanOn")),
        last_ctrl_err: coerce_string(get("lastCtrlErr"), ""),
    }
}

/// Métriques physiques historisées
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "T")]
    Temperature,
    #[serde(rename = "H")]
    Humidity,
    #[serde(rename = "HI")]
    HeatIndex,
    #[serde(rename = "gas")]
    Gas,
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "luz")]
    Light,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::HeatIndex,
        Metric::Gas,
        Metric::Base,
        Metric::Light,
    ];

    /// Clé du champ dans le contrat `live`
    pub fn key(self) -> &'static str {
        match self {
            Metric::Temperature => "T",
            Metric::Humidity => "H",
            Metric::HeatIndex => "HI",
            Metric::Gas => "gas",
            Metric::Base => "base",
            Metric::Light => "luz",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.key() == key)
    }

    /// Valeur courante de la métrique dans une télémétrie
    pub fn read(self, t: &Telemetry) -> Option<f64> {
        match self {
            Metric::Temperature => t.t,
            Metric::Humidity => t.h,
            Metric::HeatIndex => t.hi,
            Metric::Gas => t.gas,
            Metric::Base => t.base,
            Metric::Light => t.luz,
        }
    }
}

// null est traité comme absent
fn field<'a>(obj: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a Value> {
    obj?.get(key).filter(|v| !v.is_null())
}

/// Nombre fini ou absent. Plus strict qu'un `+x` JavaScript : chaîne vide,
/// blancs et tableaux (`[5]`) sont absents au lieu de valoir 0 ou 5.
pub(crate) fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok()?
        }
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Champs entiers (seq, ts_*) tronqués : `seq` 1.2 et 1.7 donnent le même
/// marqueur, un device ne publie que des compteurs entiers.
pub(crate) fn coerce_i64(value: Option<&Value>) -> Option<i64> {
    let n = coerce_f64(value)?.trunc();
    // 2^63 : hors plage i64 => absent plutôt que saturé
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (n >= -LIMIT && n < LIMIT).then_some(n as i64)
}

pub(crate) fn coerce_bool(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

pub(crate) fn coerce_string(value: Option<&Value>, default: &str) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => default.to_string(),
    }
}
