//! Event orchestration for one courier session
//!
//! The Tracker is the central event processor that coordinates:
//! - Session state (current position, alert record, cached route)
//! - The stop directory (reads and status changes)
//! - Egress of alerts and routes
//! - Metrics for every processed event

mod handlers;

use crate::domain::types::{EventType, InputEvent};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::directory::StopDirectory;
use crate::io::egress::Egress;
use crate::services::session::Session;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Central event processor for a tracking session
pub struct Tracker<D: StopDirectory> {
    /// Position, alert record and cached route
    pub(crate) session: Arc<Session>,
    /// Source of stops and sink for status changes
    pub(crate) directory: D,
    /// Writes alerts and routes to file
    pub(crate) egress: Egress,
    /// Application configuration
    pub(crate) config: Config,
    /// Metrics collector
    pub(crate) metrics: Arc<Metrics>,
}

impl<D: StopDirectory> Tracker<D> {
    pub fn new(config: Config, directory: D, metrics: Arc<Metrics>) -> Self {
        let egress = Egress::new(config.egress_file());
        let session = Arc::new(Session::new(config.threshold_m()));
        Self { session, directory, egress, config, metrics }
    }

    /// Shared handle to the session, for readers outside the event loop
    pub fn session(&self) -> Arc<Session> {
        self.session.clone()
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Consume events until the channel closes
    pub async fn run(&mut self, mut event_rx: mpsc::Receiver<InputEvent>) {
        info!(session_id = %self.session.session_id(), "tracker_started");

        while let Some(event) = event_rx.recv().await {
            self.process_event(event);
        }

        let snapshot = self.session.snapshot();
        info!(
            session_id = %snapshot.session_id,
            alerted_stops = %snapshot.alerted_stops,
            "tracker_stopped"
        );
    }

    /// Process a single event, dispatching to the appropriate handler
    pub fn process_event(&mut self, event: InputEvent) {
        match event.event_type {
            EventType::Fix(fix) => {
                self.handle_fix(fix);
            }
            EventType::StatusChange { id, status } => {
                self.handle_status_change(&id, status);
            }
            EventType::PlanRequest => {
                self.handle_plan_request();
            }
            EventType::Reset => {
                self.handle_reset();
            }
        }

        // Latency covers queueing as well as handling
        let latency_us = event.received_at.elapsed().as_micros() as u64;
        self.metrics.record_event_processed(latency_us);
    }
}
