//! Event handlers for the Tracker
//!
//! Each handler processes one input event type, updating session state
//! and triggering side effects (egress, metrics, route replanning).

use super::Tracker;
use crate::domain::route::Route;
use crate::domain::types::{PositionFix, Stop, StopId, StopStatus};
use crate::io::directory::{DirectoryError, ListFilter, StopDirectory};
use crate::io::egress::EgressRecord;
use crate::services::proximity::ProximityAlert;
use crate::services::sequencer::to_waypoints;
use std::time::Instant;
use tracing::{debug, info, warn};

impl<D: StopDirectory> Tracker<D> {
    fn all_stops(&self) -> Vec<Stop> {
        self.directory.list_stops(&ListFilter::default())
    }

    /// Handle a new position fix
    ///
    /// Runs proximity detection against every stop in the directory, writes
    /// one egress record per new alert and replans when the cached route no
    /// longer matches the position.
    pub(crate) fn handle_fix(&mut self, fix: PositionFix) -> Vec<ProximityAlert> {
        let stops = self.all_stops();
        let alerts = self.session.record_fix(fix, &stops);

        self.metrics.record_fix();
        self.metrics.set_active_stops(stops.iter().filter(|s| s.is_active()).count() as u64);
        self.metrics.set_alerted_stops(self.session.alerted_count() as u64);

        if !alerts.is_empty() {
            self.metrics.record_alerts(alerts.len() as u64);
            let session_id = self.session.session_id();
            let records: Vec<EgressRecord> = alerts
                .iter()
                .map(|alert| EgressRecord::alert(&session_id, self.config.site_id(), alert, fix.timestamp_ms))
                .collect();
            self.write_egress(&records);
        }

        if let Some(nearest) = self.session.nearest_active(&stops) {
            debug!(
                stop_id = %nearest.stop.id,
                distance_m = ?nearest.distance_m,
                "nearest_stop"
            );
        }

        if self.config.replan_on_fix() && self.session.route_is_stale(self.config.replan_distance_m()) {
            self.plan_and_egress(&stops);
        }

        alerts
    }

    /// Handle an externally requested status change
    ///
    /// Completed stops drop out of alerting and routing from the next fix
    /// on. The cached route is invalidated so the next fix replans.
    pub(crate) fn handle_status_change(&mut self, id: &StopId, status: StopStatus) -> Option<Stop> {
        match self.directory.update_status(id, status) {
            Ok(stop) => {
                self.metrics.record_status_update();
                self.session.invalidate_route();
                info!(
                    stop_id = %stop.id,
                    name = %stop.name,
                    status = %stop.status.as_str(),
                    "stop_status_changed"
                );
                Some(stop)
            }
            Err(DirectoryError::NotFound(id)) => {
                warn!(stop_id = %id, "status_change_unknown_stop");
                None
            }
            Err(e) => {
                warn!(stop_id = %id, error = %e, "status_change_failed");
                None
            }
        }
    }

    /// Handle an explicit route request
    pub(crate) fn handle_plan_request(&mut self) -> Route {
        let stops = self.all_stops();
        self.plan_and_egress(&stops)
    }

    /// Handle a session reset (logout/restart)
    pub(crate) fn handle_reset(&mut self) {
        self.session.reset();
        self.metrics.record_reset();
        self.metrics.set_alerted_stops(0);
    }

    /// Write records out, counting the ones that failed
    fn write_egress(&self, records: &[EgressRecord]) {
        let written = self.egress.write_records(records);
        let failed = records.len() - written;
        if failed > 0 {
            self.metrics.record_egress_failed(failed as u64);
        }
    }

    /// Plan a route from the current position, record it and write it out
    fn plan_and_egress(&mut self, stops: &[Stop]) -> Route {
        let plan_start = Instant::now();
        let route = self.session.plan_route(stops);
        self.metrics.record_route_planned(plan_start.elapsed().as_micros() as u64);

        let session_id = self.session.session_id();
        let record = EgressRecord::route(&session_id, self.config.site_id(), &route, to_waypoints(&route));
        self.write_egress(std::slice::from_ref(&record));

        info!(
            session_id = %session_id,
            stops = %route.len(),
            total_m = %route.total_m(),
            next_stop = ?route.stops.first().map(|s| s.id.as_str()),
            "route_published"
        );
        route
    }
}
