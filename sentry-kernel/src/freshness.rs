/*!
 * FRAÎCHEUR - Marqueur de changement + machine d'état LIVE/STALE
 *
 * RÔLE :
 * Décide si le device "parle encore". Un snapshot n'apporte de l'information
 * que si son marqueur (ts_server, sinon seq) diffère du précédent. Sans
 * information nouvelle pendant `timeout_ms`, le contrôle périodique passe en
 * STALE et la vue exposée est forcée OFFLINE.
 *
 * TRANSITIONS :
 * - STALE -> LIVE : marqueur non nul et différent du dernier (toujours prioritaire)
 * - LIVE -> STALE : contrôle périodique, `now - référence > timeout_ms`
 * - marqueur identique : aucune transition
 */

use crate::models::Telemetry;
use serde::Serialize;

pub const DEFAULT_OFFLINE_TIMEOUT_MS: u64 = 4000;

/// Timeout comparable à un âge signé; sature au lieu de boucler
pub fn timeout_as_i64(timeout_ms: u64) -> i64 {
    i64::try_from(timeout_ms).unwrap_or(i64::MAX)
}

/// Marqueur de changement, par ordre de préférence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum Marker {
    /// horodatage serveur, insensible à la dérive d'horloge du device
    TsServer(i64),
    /// compteur local du device, monotone par device uniquement
    Seq(i64),
}

impl Marker {
    pub fn value(self) -> i64 {
        match self {
            Marker::TsServer(v) | Marker::Seq(v) => v,
        }
    }
}

/// `ts_server` si présent, sinon `seq`, sinon aucun
pub fn select_marker(t: &Telemetry) -> Option<Marker> {
    t.ts_server
        .map(Marker::TsServer)
        .or_else(|| t.seq.map(Marker::Seq))
}

/// Motif d'un passage OFFLINE, exposé tel quel dans `motivo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StaleReason {
    #[serde(rename = "STALE DATA")]
    StaleData,
    #[serde(rename = "LINK LOST")]
    LinkLost,
}

impl StaleReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StaleReason::StaleData => "STALE DATA",
            StaleReason::LinkLost => "LINK LOST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Liveness {
    Live,
    Stale(StaleReason),
}

impl Liveness {
    pub fn is_stale(self) -> bool {
        matches!(self, Liveness::Stale(_))
    }
}

/// Résultat d'une observation de snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// marqueur nouveau : historiser + LIVE
    Distinct(Marker),
    /// marqueur identique au précédent
    Duplicate,
    /// ni ts_server ni seq
    NoMarker,
}

impl Observation {
    pub fn is_distinct(self) -> bool {
        matches!(self, Observation::Distinct(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreshnessState {
    pub last_marker: Option<Marker>,
    pub last_change_at: i64,
    pub liveness: Liveness,
}

impl FreshnessState {
    /// STALE par défaut tant qu'aucun snapshot n'est arrivé
    pub fn new(now_ms: i64) -> Self {
        Self {
            last_marker: None,
            last_change_at: now_ms,
            liveness: Liveness::Stale(StaleReason::StaleData),
        }
    }

    pub fn is_stale(&self) -> bool {
        self.liveness.is_stale()
    }

    /// Étape d'ingestion : compare le marqueur et repasse LIVE s'il est nouveau
    pub fn observe(&mut self, marker: Option<Marker>, now_ms: i64) -> Observation {
        match marker {
            None => Observation::NoMarker,
            Some(m) if Some(m) == self.last_marker => Observation::Duplicate,
            Some(m) => {
                self.last_marker = Some(m);
                self.last_change_at = now_ms;
                self.liveness = Liveness::Live;
                Observation::Distinct(m)
            }
        }
    }

    /// Âge de la dernière information : ts_server du dernier snapshot si connu,
    /// sinon instant du dernier changement
    pub fn age_ms(&self, last_ts_server: Option<i64>, now_ms: i64) -> i64 {
        let reference = last_ts_server.unwrap_or(self.last_change_at);
        now_ms.saturating_sub(reference)
    }

    /// Contrôle périodique; ne fait que LIVE -> STALE. Retourne true sur transition.
    pub fn check(&mut self, last_ts_server: Option<i64>, now_ms: i64, timeout_ms: u64) -> bool {
        if self.is_stale() {
            return false;
        }
        if self.age_ms(last_ts_server, now_ms) > timeout_as_i64(timeout_ms) {
            self.liveness = Liveness::Stale(StaleReason::StaleData);
            return true;
        }
        false
    }

    /// Force STALE pour un autre motif (lien perdu); retourne true si `liveness` a changé
    pub fn force_stale(&mut self, reason: StaleReason) -> bool {
        let next = Liveness::Stale(reason);
        if self.liveness == next {
            return false;
        }
        self.liveness = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::normalize;
    use serde_json::json;

    const TIMEOUT: u64 = 4000;

    #[test]
    fn test_marker_prefers_ts_server() {
        let t = normalize(&json!({"seq": 3, "ts_server": 1000}));
        assert_eq!(select_marker(&t), Some(Marker::TsServer(1000)));
        let t = normalize(&json!({"seq": 3}));
        assert_eq!(select_marker(&t), Some(Marker::Seq(3)));
        let t = normalize(&json!({"T": 20}));
        assert_eq!(select_marker(&t), None);
    }

    #[test]
    fn test_initial_state_is_stale() {
        let st = FreshnessState::new(0);
        assert_eq!(st.liveness, Liveness::Stale(StaleReason::StaleData));
        assert_eq!(st.last_marker, None);
    }

    #[test]
    fn test_distinct_marker_goes_live() {
        let mut st = FreshnessState::new(0);
        let obs = st.observe(Some(Marker::Seq(1)), 50);
        assert_eq!(obs, Observation::Distinct(Marker::Seq(1)));
        assert_eq!(st.liveness, Liveness::Live);
        assert_eq!(st.last_change_at, 50);
    }

    #[test]
    fn test_duplicate_and_missing_markers_do_nothing() {
        let mut st = FreshnessState::new(0);
        st.observe(Some(Marker::Seq(1)), 10);
        let before = st.clone();

        assert_eq!(st.observe(Some(Marker::Seq(1)), 500), Observation::Duplicate);
        assert_eq!(st.observe(None, 600), Observation::NoMarker);
        assert_eq!(st, before);
    }

    #[test]
    fn test_duplicate_does_not_revive_stale() {
        let mut st = FreshnessState::new(0);
        st.observe(Some(Marker::Seq(1)), 0);
        assert!(st.check(None, TIMEOUT as i64 + 1, TIMEOUT));
        assert_eq!(st.observe(Some(Marker::Seq(1)), TIMEOUT as i64 + 2), Observation::Duplicate);
        assert!(st.is_stale());
    }

    #[test]
    fn test_timeout_uses_last_change_without_ts_server() {
        let mut st = FreshnessState::new(0);
        st.observe(Some(Marker::Seq(7)), 1000);
        assert!(!st.check(None, 1000 + TIMEOUT as i64, TIMEOUT));
        assert!(st.check(None, 1001 + TIMEOUT as i64, TIMEOUT));
        assert_eq!(st.liveness, Liveness::Stale(StaleReason::StaleData));
    }

    #[test]
    fn test_timeout_uses_ts_server_when_known() {
        let mut st = FreshnessState::new(0);
        // reçu à 9000 mais horodaté 1000 par le serveur
        st.observe(Some(Marker::TsServer(1000)), 9000);
        assert!(st.check(Some(1000), 9000, TIMEOUT));
    }

    #[test]
    fn test_check_never_revives() {
        let mut st = FreshnessState::new(0);
        assert!(!st.check(None, 1, TIMEOUT));
        assert!(st.is_stale());
    }

    #[test]
    fn test_recovery_after_long_gap() {
        let mut st = FreshnessState::new(0);
        st.observe(Some(Marker::TsServer(1000)), 1000);
        st.check(Some(1000), 1_000_000, TIMEOUT);
        assert!(st.is_stale());
        assert!(st.observe(Some(Marker::TsServer(5000)), 2_000_000).is_distinct());
        assert_eq!(st.liveness, Liveness::Live);
    }

    #[test]
    fn test_seq_and_ts_server_markers_are_distinct() {
        let mut st = FreshnessState::new(0);
        st.observe(Some(Marker::Seq(5)), 0);
        assert!(st.observe(Some(Marker::TsServer(5)), 1).is_distinct());
    }

    #[test]
    fn test_force_stale_reports_changes_only() {
        let mut st = FreshnessState::new(0);
        st.observe(Some(Marker::Seq(1)), 0);
        assert!(st.force_stale(StaleReason::LinkLost));
        assert!(!st.force_stale(StaleReason::LinkLost));
        assert_eq!(StaleReason::LinkLost.as_str(), "LINK LOST");
    }

    #[test]
    fn test_timeout_beyond_i64_does_not_wrap() {
        let mut st = FreshnessState::new(0);
        st.observe(Some(Marker::Seq(1)), 0);
        assert!(!st.check(None, 0, u64::MAX));
        assert!(!st.check(None, 1_000_000_000, u64::MAX));
        assert_eq!(timeout_as_i64(u64::MAX), i64::MAX);
        assert_eq!(timeout_as_i64(TIMEOUT), 4000);
    }
}
