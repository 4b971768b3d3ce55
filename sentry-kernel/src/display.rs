/*!
 * AFFICHAGE - Règles de présentation partagées par les vues console
 *
 * Ton du badge de statut, niveau de luminosité, plages des capteurs pour les
 * sparklines et formatage des lectures. Pur, sans état.
 */

use crate::models::Metric;
use serde::Serialize;
use time::macros::format_description;
use time::OffsetDateTime;

/// Ton visuel du badge de statut
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTone {
    Offline,
    Danger,
    Warning,
    Normal,
    Unknown,
}

pub fn status_tone(estado: &str, online: bool) -> StatusTone {
    if !online {
        return StatusTone::Offline;
    }
    let s = estado.to_uppercase();
    if s.contains("PELIGRO") || s.contains("DANGER") {
        StatusTone::Danger
    } else if s.contains("ALERTA") || s.contains("WARNING") {
        StatusTone::Warning
    } else if s.contains("NORMAL") || s.contains("OK") {
        StatusTone::Normal
    } else {
        StatusTone::Unknown
    }
}

/// Niveau de lumière à partir de l'ADC du LDR
pub fn light_level(luz: Option<f64>) -> &'static str {
    match luz {
        None => "-",
        Some(v) if v > 700.0 => "ALTA",
        Some(v) if v > 300.0 => "NORMAL",
        Some(_) => "OSCURO",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorRange {
    pub min: f64,
    pub max: f64,
}

/// Plages d'affichage des sparklines
pub fn sensor_range(metric: Metric) -> SensorRange {
    let (min, max) = match metric {
        Metric::Temperature => (-10.0, 80.0),
        Metric::Humidity => (0.0, 100.0),
        Metric::HeatIndex => (-10.0, 90.0),
        Metric::Gas => (0.0, 100.0),
        Metric::Base => (0.0, 100.0),
        Metric::Light => (0.0, 1000.0),
    };
    SensorRange { min, max }
}

/// `--` si absent; 0 décimale à partir de 100, sinon 1
pub fn format_reading(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => {
            if v.abs() >= 100.0 {
                format!("{v:.0}")
            } else {
                format!("{v:.1}")
            }
        }
        _ => "--".to_string(),
    }
}

/// HH:MM:SS (UTC) d'un epoch ms, `--:--:--` si illisible
pub fn format_clock(ms: Option<i64>) -> String {
    let Some(ms) = ms else {
        return "--:--:--".to_string();
    };
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .ok()
        .and_then(|dt| dt.format(format_description!("[hour]:[minute]:[second]")).ok())
        .unwrap_or_else(|| "--:--:--".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tone() {
        assert_eq!(status_tone("PELIGRO", false), StatusTone::Offline);
        assert_eq!(status_tone("peligro gas", true), StatusTone::Danger);
        assert_eq!(status_tone("ALERTA", true), StatusTone::Warning);
        assert_eq!(status_tone("Normal", true), StatusTone::Normal);
        assert_eq!(status_tone("DESCONOCIDO", true), StatusTone::Unknown);
    }

    #[test]
    fn test_light_level_thresholds() {
        assert_eq!(light_level(None), "-");
        assert_eq!(light_level(Some(701.0)), "ALTA");
        assert_eq!(light_level(Some(700.0)), "NORMAL");
        assert_eq!(light_level(Some(301.0)), "NORMAL");
        assert_eq!(light_level(Some(300.0)), "OSCURO");
    }

    #[test]
    fn test_format_reading() {
        assert_eq!(format_reading(None), "--");
        assert_eq!(format_reading(Some(25.34)), "25.3");
        assert_eq!(format_reading(Some(640.4)), "640");
        assert_eq!(format_reading(Some(-3.0)), "-3.0");
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(None), "--:--:--");
        // 1970-01-01 01:02:03 UTC
        assert_eq!(format_clock(Some(3_723_000)), "01:02:03");
    }

    #[test]
    fn test_ranges() {
        assert_eq!(sensor_range(Metric::Light), SensorRange { min: 0.0, max: 1000.0 });
        assert_eq!(sensor_range(Metric::Temperature).min, -10.0);
    }
}
