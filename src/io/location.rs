//! Location source - newline-delimited JSON input
//!
//! Each line is one message tagged by `type`:
//!
//! ```text
//! {"type":"fix","latitude":-6.2,"longitude":106.8,"timestamp":"2026-01-05T16:41:30Z"}
//! {"type":"status","id":"42","status":"delivered"}
//! {"type":"plan"}
//! {"type":"reset"}
//! ```
//!
//! Fixes pass a cadence policy before they reach the tracker: a fix is
//! forwarded when the device moved at least `min_distance_m` or at least
//! `min_interval_ms` passed since the last forwarded fix.

use crate::domain::types::{
    epoch_ms, Coordinate, CoordinateError, EventType, InputEvent, InputMessage, PositionFix,
    StopId, StopStatus, TimestampValue,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::geo::distance_meters;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("malformed input line: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid fix: {0}")]
    Coordinate(#[from] CoordinateError),
    #[error("invalid timestamp: {0}")]
    Timestamp(String),
    #[error("invalid status change: {0}")]
    Status(String),
}

/// Parse RFC 3339 timestamp to epoch milliseconds
fn parse_iso_time(time_str: &str) -> Option<u64> {
    OffsetDateTime::parse(time_str, &Rfc3339)
        .ok()
        .and_then(|dt| u64::try_from(dt.unix_timestamp_nanos() / 1_000_000).ok())
}

/// Resolve a fix timestamp; a missing one means "now"
fn timestamp_to_epoch_ms(ts: &TimestampValue, received_ms: u64) -> Result<u64, InputError> {
    match ts {
        TimestampValue::EpochMs(ms) => Ok(*ms),
        TimestampValue::IsoString(s) => {
            parse_iso_time(s).ok_or_else(|| InputError::Timestamp(s.clone()))
        }
        TimestampValue::None => Ok(received_ms),
    }
}

/// Parse one input line into an event
pub fn parse_input_line(line: &str, received_ms: u64) -> Result<InputEvent, InputError> {
    let message: InputMessage = serde_json::from_str(line)?;

    let event_type = match message {
        InputMessage::Fix { latitude, longitude, timestamp } => {
            let coordinate = Coordinate::new(latitude, longitude)?;
            let timestamp_ms = timestamp_to_epoch_ms(&timestamp, received_ms)?;
            EventType::Fix(PositionFix::new(coordinate, timestamp_ms))
        }
        InputMessage::Status { id, status } => {
            let id = id.trim();
            if id.is_empty() {
                return Err(InputError::Status("stop id is required".to_string()));
            }
            let status: StopStatus = status.parse().map_err(InputError::Status)?;
            EventType::StatusChange { id: StopId::new(id), status }
        }
        InputMessage::Plan => EventType::PlanRequest,
        InputMessage::Reset => EventType::Reset,
    };

    Ok(InputEvent::new(event_type))
}

/// Cadence policy for position fixes
///
/// The first fix always passes. Later fixes pass when either the distance
/// or the time condition holds against the last forwarded fix. Time is
/// measured on fix timestamps, so replayed input throttles the same way
/// as live input.
#[derive(Debug, Clone)]
pub struct FixThrottler {
    min_distance_m: u32,
    min_interval_ms: u64,
    last_forwarded: Option<PositionFix>,
}

impl FixThrottler {
    pub fn new(min_distance_m: u32, min_interval_ms: u64) -> Self {
        Self { min_distance_m, min_interval_ms, last_forwarded: None }
    }

    /// Check whether a fix should be forwarded, remembering it if so
    pub fn should_forward(&mut self, fix: &PositionFix) -> bool {
        if let Some(last) = self.last_forwarded {
            let moved = distance_meters(last.coordinate, fix.coordinate) >= self.min_distance_m;
            let waited = fix.timestamp_ms.saturating_sub(last.timestamp_ms) >= self.min_interval_ms;
            if !moved && !waited {
                return false;
            }
        }
        self.last_forwarded = Some(*fix);
        true
    }

    pub fn reset(&mut self) {
        self.last_forwarded = None;
    }
}

/// Read input lines and send parsed events to the channel
///
/// Events are sent via try_send so a slow tracker never blocks the reader.
/// Dropped events are counted in metrics and logged (rate-limited).
/// Returns when the input ends, the channel closes, or shutdown is signalled.
pub async fn start_location_source<R>(
    reader: R,
    config: &Config,
    event_tx: mpsc::Sender<InputEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut throttler = FixThrottler::new(config.min_distance_m(), config.min_interval_ms());

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    info!(
        min_distance_m = %config.min_distance_m(),
        min_interval_ms = %config.min_interval_ms(),
        "location_source_started"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("location_source_shutdown");
                    return Ok(());
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("location_source_eof");
                    return Ok(());
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let event = match parse_input_line(line, epoch_ms()) {
                    Ok(event) => event,
                    Err(e) => {
                        metrics.record_input_rejected();
                        warn!(error = %e, "input_rejected");
                        continue;
                    }
                };

                match &event.event_type {
                    EventType::Fix(fix) if !throttler.should_forward(fix) => {
                        metrics.record_fix_throttled();
                        debug!(coordinate = %fix.coordinate, "fix_throttled");
                        continue;
                    }
                    EventType::Reset => throttler.reset(),
                    _ => {}
                }

                if let Err(e) = event_tx.try_send(event) {
                    match e {
                        TrySendError::Full(_) => {
                            metrics.record_event_dropped();
                            if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                warn!("input_event_dropped: channel full");
                                last_drop_warn = Instant::now();
                            }
                        }
                        TrySendError::Closed(_) => {
                            warn!("Event channel closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
