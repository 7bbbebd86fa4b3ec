//! One-shot proximity alerts
//!
//! A stop alerts the first time a fix lands within the threshold radius.
//! After that its ID stays in the alert record for the rest of the session:
//! leaving and re-entering the radius does not alert again. Only `reset()`
//! clears the record.

use crate::domain::types::{Coordinate, Stop, StopId};
use crate::services::geo::distance_meters;
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, info};

/// Default alert radius (100 m)
pub const DEFAULT_THRESHOLD_M: u32 = 100;

/// A stop that entered the alert radius for the first time this session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProximityAlert {
    pub stop: Stop,
    pub distance_m: u32,
}

/// Detects first entry into the alert radius of each stop
#[derive(Debug, Clone)]
pub struct ProximityDetector {
    threshold_m: u32,
    /// Stop IDs that already alerted this session
    alerted: FxHashSet<StopId>,
}

impl ProximityDetector {
    pub fn new(threshold_m: u32) -> Self {
        Self { threshold_m, alerted: FxHashSet::default() }
    }

    #[inline]
    pub fn threshold_m(&self) -> u32 {
        self.threshold_m
    }

    /// Check a fix against all stops and return the newly triggered alerts,
    /// nearest first.
    ///
    /// Stops without a coordinate or already delivered/cancelled are skipped.
    pub fn on_position_fix(&mut self, position: Coordinate, stops: &[Stop]) -> Vec<ProximityAlert> {
        let mut triggered: Vec<(usize, u32)> = Vec::new();

        for (idx, stop) in stops.iter().enumerate() {
            let Some(coord) = stop.active_coordinate() else {
                continue;
            };
            if self.alerted.contains(&stop.id) {
                continue;
            }
            let distance_m = distance_meters(position, coord);
            if distance_m <= self.threshold_m {
                triggered.push((idx, distance_m));
            }
        }

        // Stable: equal distances keep input order
        triggered.sort_by_key(|&(_, d)| d);

        let mut alerts = Vec::with_capacity(triggered.len());
        for (idx, distance_m) in triggered {
            let stop = &stops[idx];
            // Duplicate IDs in one batch alert once
            if !self.alerted.insert(stop.id.clone()) {
                debug!(stop_id = %stop.id, "proximity_duplicate_id_skipped");
                continue;
            }
            info!(
                stop_id = %stop.id,
                name = %stop.name,
                distance_m = %distance_m,
                threshold_m = %self.threshold_m,
                "proximity_alert"
            );
            alerts.push(ProximityAlert { stop: stop.clone(), distance_m });
        }

        alerts
    }

    /// Whether a stop has already alerted this session
    pub fn has_alerted(&self, id: &StopId) -> bool {
        self.alerted.contains(id)
    }

    /// Number of stops that alerted this session
    pub fn alerted_count(&self) -> usize {
        self.alerted.len()
    }

    /// Forget all alerts; any stop may alert again afterwards
    pub fn reset(&mut self) {
        debug!(cleared = %self.alerted.len(), "proximity_reset");
        self.alerted.clear();
    }
}

impl Default for ProximityDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_M)
    }
}
