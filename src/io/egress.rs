//! Alert and route egress - writes records to file
//!
//! Records are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::route::{Route, Waypoints};
use crate::domain::types::{Coordinate, StopId};
use crate::services::proximity::ProximityAlert;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// One egress line
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EgressRecord {
    Alert {
        session_id: String,
        site: String,
        stop_id: StopId,
        name: String,
        address: String,
        distance_m: u32,
        ts: u64,
    },
    Route {
        session_id: String,
        site: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        origin: Option<Coordinate>,
        stops: Vec<StopId>,
        total_m: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        waypoints: Option<Waypoints>,
        ts: u64,
    },
}

impl EgressRecord {
    pub fn alert(session_id: &str, site: &str, alert: &ProximityAlert, ts: u64) -> Self {
        EgressRecord::Alert {
            session_id: session_id.to_string(),
            site: site.to_string(),
            stop_id: alert.stop.id.clone(),
            name: alert.stop.name.clone(),
            address: alert.stop.address.clone(),
            distance_m: alert.distance_m,
            ts,
        }
    }

    pub fn route(session_id: &str, site: &str, route: &Route, waypoints: Option<Waypoints>) -> Self {
        EgressRecord::Route {
            session_id: session_id.to_string(),
            site: site.to_string(),
            origin: route.origin,
            stops: route.stop_ids().cloned().collect(),
            total_m: route.total_m(),
            waypoints,
            ts: route.planned_at_ms,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EgressRecord::Alert { .. } => "alert",
            EgressRecord::Route { .. } => "route",
        }
    }
}

/// Egress writer for alert and route records
pub struct Egress {
    file_path: String,
}

impl Egress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Write a record to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_record(&self, record: &EgressRecord) -> bool {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                error!(kind = %record.kind(), error = %e, "egress_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => true,
            Err(e) => {
                error!(kind = %record.kind(), error = %e, "egress_write_failed");
                false
            }
        }
    }

    /// Write multiple records, returning how many succeeded
    pub fn write_records(&self, records: &[EgressRecord]) -> usize {
        records.iter().filter(|r| self.write_record(r)).count()
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }
}
