/*!
 * SANTÉ DES LIENS - Statut réseau du lien télémétrie et du lien contrôle
 *
 * Chaque lien expose `{ok, lastErr, lastMs}` (SYNC OK / SYNC ERROR côté
 * console). Le lien télémétrie garde en plus l'instant du premier échec de
 * la série en cours : c'est lui qui déclenche LINK LOST une fois le timeout
 * dépassé.
 */

use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetStatus {
    pub ok: bool,
    #[serde(rename = "lastErr")]
    pub last_err: Option<String>,
    #[serde(rename = "lastMs")]
    pub last_ms: Option<i64>,
    #[serde(skip)]
    down_since: Option<i64>,
}

impl Default for NetStatus {
    fn default() -> Self {
        Self {
            ok: true,
            last_err: None,
            last_ms: None,
            down_since: None,
        }
    }
}

impl NetStatus {
    pub fn mark_ok(&mut self, now_ms: i64) {
        self.ok = true;
        self.last_err = None;
        self.last_ms = Some(now_ms);
        self.down_since = None;
    }

    pub fn mark_err(&mut self, err: impl Into<String>, now_ms: i64) {
        self.ok = false;
        self.last_err = Some(err.into());
        self.last_ms = Some(now_ms);
        if self.down_since.is_none() {
            self.down_since = Some(now_ms);
        }
    }

    /// Durée de la panne en cours, None si le lien est sain
    pub fn down_for_ms(&self, now_ms: i64) -> Option<i64> {
        self.down_since.map(|since| now_ms.saturating_sub(since))
    }

    pub fn label(&self) -> &'static str {
        if self.ok {
            "SYNC OK"
        } else {
            "SYNC ERROR"
        }
    }
}

/// Compteurs d'activité du moteur
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub snapshots: u64,
    pub distinct: u64,
    pub duplicates: u64,
    pub unmarked: u64,
    pub transport_errors: u64,
    pub control_errors: u64,
}

/// Santé du kernel exposée sur /health
#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub stale: bool,
    pub link: &'static str,
    pub ctrl_link: &'static str,
    pub stats: EngineStats,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn get_health(&self, view: &crate::engine::EngineView) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            stale: view.freshness.is_stale(),
            link: view.net.label(),
            ctrl_link: view.ctrl_net.label(),
            stats: view.stats.clone(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_down_since_tracks_first_failure() {
        let mut net = NetStatus::default();
        assert_eq!(net.down_for_ms(100), None);

        net.mark_err("timeout", 100);
        net.mark_err("refused", 300);
        assert_eq!(net.down_for_ms(1100), Some(1000));
        assert_eq!(net.last_err.as_deref(), Some("refused"));
        assert_eq!(net.label(), "SYNC ERROR");

        net.mark_ok(1200);
        assert!(net.ok);
        assert_eq!(net.down_for_ms(5000), None);
        assert_eq!(net.last_err, None);
    }

    #[test]
    fn test_serialized_shape() {
        let mut net = NetStatus::default();
        net.mark_err("boom", 5);
        let v = serde_json::to_value(&net).unwrap();
        assert_eq!(v, serde_json::json!({"ok": false, "lastErr": "boom", "lastMs": 5}));
    }
}
