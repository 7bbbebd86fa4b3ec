//! Tracking session state
//!
//! Holds the latest position fix, the proximity alert record and the cached
//! route for one tracking session. All mutation happens behind a single
//! mutex so that one fix is processed as one critical section: two fixes can
//! never interleave their alert-record updates.
//!
//! Route recomputation is caller-driven. The session never replans on its
//! own; callers ask `route_is_stale()` and call `plan_route()` when they
//! want a fresh plan.

use crate::domain::route::Route;
use crate::domain::types::{epoch_ms, PositionFix, Stop};
use crate::services::geo::distance_meters;
use crate::services::proximity::{ProximityAlert, ProximityDetector};
use crate::services::ranker::{self, RankedStop};
use crate::services::sequencer;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_session_id() -> String {
    Uuid::now_v7().to_string()
}

struct SessionState {
    session_id: String,
    started_at_ms: u64,
    last_fix: Option<PositionFix>,
    detector: ProximityDetector,
    route: Option<Route>,
}

impl SessionState {
    fn new(threshold_m: u32) -> Self {
        Self {
            session_id: new_session_id(),
            started_at_ms: epoch_ms(),
            last_fix: None,
            detector: ProximityDetector::new(threshold_m),
            route: None,
        }
    }
}

/// Point-in-time view of a session for logging and metrics
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub started_at_ms: u64,
    pub last_fix: Option<PositionFix>,
    pub alerted_stops: usize,
    pub route_len: Option<usize>,
}

/// Shared tracking session
pub struct Session {
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(threshold_m: u32) -> Self {
        let state = SessionState::new(threshold_m);
        info!(session_id = %state.session_id, threshold_m = %threshold_m, "session_started");
        Self { state: Mutex::new(state) }
    }

    pub fn session_id(&self) -> String {
        self.state.lock().session_id.clone()
    }

    /// Latest position fix, if any
    pub fn position(&self) -> Option<PositionFix> {
        self.state.lock().last_fix
    }

    /// Replace the current position and run proximity detection.
    ///
    /// Position replacement and alert-record update happen under one lock.
    pub fn record_fix(&self, fix: PositionFix, stops: &[Stop]) -> Vec<ProximityAlert> {
        let mut state = self.state.lock();
        state.last_fix = Some(fix);
        state.detector.on_position_fix(fix.coordinate, stops)
    }

    /// Plan a route from the current position and cache it
    ///
    /// Without a fix the plan is seeded from the first active stop.
    pub fn plan_route(&self, stops: &[Stop]) -> Route {
        let mut state = self.state.lock();
        let origin = state.last_fix.map(|f| f.coordinate);
        let route = sequencer::plan_route(origin, stops, epoch_ms());
        state.route = Some(route.clone());
        route
    }

    /// Most recently planned route, if still cached
    pub fn cached_route(&self) -> Option<Route> {
        self.state.lock().route.clone()
    }

    /// Drop the cached route (stops changed)
    pub fn invalidate_route(&self) {
        if self.state.lock().route.take().is_some() {
            debug!("route_invalidated");
        }
    }

    /// Whether the cached route no longer reflects the current position
    ///
    /// Stale when there is no cached route, when the route was seeded
    /// without a fix and one has since arrived, or when the position moved
    /// more than `replan_distance_m` away from the route origin.
    pub fn route_is_stale(&self, replan_distance_m: u32) -> bool {
        let state = self.state.lock();
        let Some(route) = &state.route else {
            return true;
        };
        match (route.origin, state.last_fix) {
            (Some(origin), Some(fix)) => distance_meters(origin, fix.coordinate) > replan_distance_m,
            (None, Some(_)) => true,
            (_, None) => false,
        }
    }

    /// Rank stops by distance from the current position
    pub fn rank<'a>(&self, stops: &'a [Stop]) -> Vec<RankedStop<'a>> {
        let origin = self.position().map(|f| f.coordinate);
        ranker::rank(origin, stops)
    }

    /// Closest active stop from the current position
    pub fn nearest_active<'a>(&self, stops: &'a [Stop]) -> Option<RankedStop<'a>> {
        let origin = self.position().map(|f| f.coordinate);
        ranker::nearest_active(origin, stops)
    }

    pub fn alerted_count(&self) -> usize {
        self.state.lock().detector.alerted_count()
    }

    /// Clear position, alert record and cached route and start a new session
    ///
    /// Meant for explicit logout/restart, not for gaps in the fix stream.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let threshold_m = state.detector.threshold_m();
        let previous = std::mem::replace(&mut *state, SessionState::new(threshold_m));
        info!(
            previous_session_id = %previous.session_id,
            session_id = %state.session_id,
            alerted_stops = %previous.detector.alerted_count(),
            "session_reset"
        );
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            session_id: state.session_id.clone(),
            started_at_ms: state.started_at_ms,
            last_fix: state.last_fix,
            alerted_stops: state.detector.alerted_count(),
            route_len: state.route.as_ref().map(Route::len),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(crate::services::proximity::DEFAULT_THRESHOLD_M)
    }
}
