/*!
 * HISTORIQUE - Buffers glissants par métrique pour les sparklines
 *
 * Capacité fixe, éviction FIFO : une fois plein, le point le plus ancien
 * sort à chaque nouvel ajout. Les buffers ne sont alimentés que par un
 * snapshot distinct (voir `engine`).
 */

use crate::models::{Metric, Telemetry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

pub const DEFAULT_HISTORY_LEN: usize = 60;

/// Un point de série : `t` = ts_ms du device ou horloge murale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub t: i64,
    pub v: f64,
}

/// Buffer borné d'une métrique (du plus ancien au plus récent)
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryBuffer {
    cap: usize,
    points: VecDeque<HistoryPoint>,
}

impl HistoryBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            points: VecDeque::with_capacity(cap.min(1024)),
        }
    }

    /// Ajoute un point et tronque par l'avant jusqu'à `cap`
    pub fn push(&mut self, point: HistoryPoint) {
        if self.cap == 0 {
            return;
        }
        self.points.push_back(point);
        while self.points.len() > self.cap {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn last(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }

    pub fn to_vec(&self) -> Vec<HistoryPoint> {
        self.points.iter().copied().collect()
    }
}

impl Serialize for HistoryBuffer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.points.iter())
    }
}

/// Ensemble des buffers, un par métrique
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HistorySet {
    buffers: BTreeMap<Metric, HistoryBuffer>,
}

impl HistorySet {
    pub fn new(cap: usize) -> Self {
        let buffers = Metric::ALL
            .into_iter()
            .map(|m| (m, HistoryBuffer::new(cap)))
            .collect();
        Self { buffers }
    }

    /// Ajoute `{ts, valeur}` pour chaque métrique présente; les absentes ne bougent pas.
    /// Retourne le nombre de métriques alimentées.
    pub fn append(&mut self, telemetry: &Telemetry, ts: i64) -> usize {
        let mut appended = 0;
        for (metric, buffer) in self.buffers.iter_mut() {
            if let Some(v) = metric.read(telemetry) {
                buffer.push(HistoryPoint { t: ts, v });
                appended += 1;
            }
        }
        appended
    }

    pub fn get(&self, metric: Metric) -> &HistoryBuffer {
        // toutes les métriques sont créées dans `new`
        &self.buffers[&metric]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &HistoryBuffer)> {
        self.buffers.iter().map(|(m, b)| (*m, b))
    }
}
